//! Wires snapshot/validate/restore into the trigger policy the context
//! engine expects (spec §4.8 "Trigger policy") and implements
//! [`quadracode_context::ports::WorkspaceIntegrityPort`] so the runtime
//! loop (C10) can hand a `WorkspaceManager` straight to the context
//! pipeline without either crate depending on the other's internals.

use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use quadracode_context::error::ContextError;
use quadracode_context::ports::WorkspaceIntegrityPort;
use quadracode_types::SnapshotRecord;
use tracing::{info, warn};

use crate::error::Result;
use crate::{restore, snapshot, validate};

/// Tracks each registered workspace's root directory and most recent
/// snapshot, and enforces the spec §4.8 trigger policy.
pub struct WorkspaceManager {
    archive_dir: PathBuf,
    roots: DashMap<String, PathBuf>,
    latest: DashMap<String, SnapshotRecord>,
    auto_restore: bool,
}

impl WorkspaceManager {
    pub fn new(archive_dir: PathBuf, auto_restore: bool) -> Self {
        Self { archive_dir, roots: DashMap::new(), latest: DashMap::new(), auto_restore }
    }

    /// Associate a workspace name with its filesystem root. Must be called
    /// before `snapshot`/`validate_on_exhaustion_change` are used for it.
    pub fn register_workspace(&self, workspace: &str, root: PathBuf) {
        self.roots.insert(workspace.to_string(), root);
    }

    fn root_of(&self, workspace: &str) -> Result<PathBuf> {
        self.roots
            .get(workspace)
            .map(|r| r.value().clone())
            .ok_or_else(|| crate::error::WorkspaceError::SnapshotNotFound(format!("unregistered workspace {workspace}")))
    }

    /// `snapshot(workspace, reason)` (spec §4.8). Called by the context
    /// engine on every skeptic-triggered transition with
    /// `reason="skeptic_rejection"`.
    pub async fn snapshot(&self, workspace: &str, reason: &str) -> Result<SnapshotRecord> {
        let root = self.root_of(workspace)?;
        let record = snapshot::snapshot(root, self.archive_dir.join(workspace), reason.to_string()).await?;
        self.latest.insert(workspace.to_string(), record.clone());
        Ok(record)
    }

    /// `validate(workspace, reference_snapshot)` (spec §4.8).
    pub async fn validate(&self, workspace: &str, reference: &SnapshotRecord) -> Result<validate::ValidationReport> {
        let root = self.root_of(workspace)?;
        validate::validate(root, reference.clone()).await
    }

    /// `restore(workspace, snapshot_record)` (spec §4.8).
    pub async fn restore(&self, workspace: &str, record: &SnapshotRecord) -> Result<()> {
        let root = self.root_of(workspace)?;
        restore::restore(root, record.clone()).await
    }
}

#[async_trait]
impl WorkspaceIntegrityPort for WorkspaceManager {
    /// spec §4.8 trigger policy: "the context engine calls ... `validate`
    /// on every exhaustion change. When `validate` reports drift and
    /// `auto_restore=true`, call `restore` and log the event; otherwise
    /// report the drift and leave the workspace untouched."
    async fn validate_on_exhaustion_change(&self, workspace: &str) -> quadracode_context::error::Result<()> {
        let Some(reference) = self.latest.get(workspace).map(|r| r.value().clone()) else {
            // No snapshot yet taken for this workspace; nothing to validate against.
            return Ok(());
        };

        let report = self.validate(workspace, &reference).await.map_err(|e| ContextError::Workspace(e.to_string()))?;
        if report.ok {
            return Ok(());
        }

        warn!(workspace, drift_paths = ?report.drift_paths, "workspace drift detected on exhaustion change");
        if self.auto_restore {
            self.restore(workspace, &reference).await.map_err(|e| ContextError::Workspace(e.to_string()))?;
            info!(workspace, snapshot_id = %reference.id, "workspace restored after drift");
        }
        Ok(())
    }

    /// spec §4.8 trigger policy: "the context engine calls
    /// `snapshot(reason="skeptic_rejection")` on every skeptic-triggered
    /// transition." A workspace with no registered root is a no-op: not
    /// every session has a materialized workspace attached.
    async fn snapshot_on_skeptic_rejection(&self, workspace: &str) -> quadracode_context::error::Result<Option<SnapshotRecord>> {
        if self.roots.get(workspace).is_none() {
            return Ok(None);
        }
        let record = self.snapshot(workspace, "skeptic_rejection").await.map_err(|e| ContextError::Workspace(e.to_string()))?;
        Ok(Some(record))
    }
}
