//! The recorder itself: an in-memory mirror for fast `replay`/`diff` plus
//! a fire-and-forget background writer appending to
//! `time_travel/<session_id>.jsonl` (spec §4.9: "Writes never block the
//! main loop"). Grounded on `knhk-autonomous-loop::audit_trail::AuditTrail`'s
//! split between an `Arc<RwLock<Vec<AuditEntry>>>` in-memory log and an
//! append-only file writer, generalized from a single global file to one
//! file per session and from a blocking `Mutex<File>` write to an
//! `mpsc`-fed background task so `log_*` calls never await a disk write.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use quadracode_types::{SessionId, SessionState};
use tokio::sync::mpsc;
use tracing::warn;

use crate::diff::CycleDiff;
use crate::error::Result;
use crate::event::{EventKind, TimeTravelEvent};

/// Append-only per-session time-travel recorder (C9).
pub struct TimeTravelRecorder {
    root_dir: PathBuf,
    memory: Arc<DashMap<SessionId, Vec<TimeTravelEvent>>>,
    writer_tx: mpsc::UnboundedSender<TimeTravelEvent>,
}

fn session_log_path(root_dir: &Path, session_id: &SessionId) -> PathBuf {
    root_dir.join(format!("{}.jsonl", session_id.0))
}

async fn writer_loop(root_dir: PathBuf, mut rx: mpsc::UnboundedReceiver<TimeTravelEvent>) {
    let mut open_files: BTreeMap<String, tokio::fs::File> = BTreeMap::new();
    while let Some(event) = rx.recv().await {
        let path = session_log_path(&root_dir, &event.session_id);
        let key = event.session_id.0.clone();
        if !open_files.contains_key(&key) {
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(error = %e, "failed to create time-travel log directory");
                    continue;
                }
            }
            match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
                Ok(file) => {
                    open_files.insert(key.clone(), file);
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to open time-travel log file");
                    continue;
                }
            }
        }

        let line = match serde_json::to_string(&event) {
            Ok(mut s) => {
                s.push('\n');
                s
            }
            Err(e) => {
                warn!(error = %e, "failed to serialize time-travel event");
                continue;
            }
        };

        if let Some(file) = open_files.get_mut(&key) {
            use tokio::io::AsyncWriteExt;
            if let Err(e) = file.write_all(line.as_bytes()).await {
                warn!(error = %e, "failed to append time-travel event");
            }
        }
    }
}

impl TimeTravelRecorder {
    /// Spawns the background writer task and returns a handle. `root_dir`
    /// is the `time_travel/` directory (spec §4.9).
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(root_dir.clone(), rx));
        Self { root_dir, memory: Arc::new(DashMap::new()), writer_tx: tx }
    }

    fn record(&self, event: TimeTravelEvent) {
        self.memory.entry(event.session_id.clone()).or_default().push(event.clone());
        // Fire-and-forget: an unbounded send never blocks the caller, and a
        // closed receiver (writer task gone) is not a runtime failure.
        if self.writer_tx.send(event).is_err() {
            warn!("time-travel writer task is no longer running; event kept in memory only");
        }
    }

    fn event(state: &SessionState, kind: EventKind, event: impl Into<String>, payload: serde_json::Value, state_update: Option<serde_json::Value>) -> TimeTravelEvent {
        TimeTravelEvent {
            ts: Utc::now(),
            session_id: state.session_id.clone(),
            cycle_id: state.cycle_counter,
            prp_state: state.prp_phase,
            exhaustion_mode: state.exhaustion.mode,
            kind,
            event: event.into(),
            payload,
            state_update,
        }
    }

    /// `log_stage(state, stage, payload, state_update?)` (spec §4.9).
    pub fn log_stage(&self, state: &SessionState, stage: impl Into<String>, payload: serde_json::Value, state_update: Option<serde_json::Value>) {
        self.record(Self::event(state, EventKind::Stage, stage, payload, state_update));
    }

    /// `log_tool(state, tool_name, payload)` (spec §4.9).
    pub fn log_tool(&self, state: &SessionState, tool_name: impl Into<String>, payload: serde_json::Value) {
        self.record(Self::event(state, EventKind::Tool, tool_name, payload, None));
    }

    /// `log_transition(state, event, payload, state_update?)` (spec §4.9).
    pub fn log_transition(&self, state: &SessionState, event: impl Into<String>, payload: serde_json::Value, state_update: Option<serde_json::Value>) {
        self.record(Self::event(state, EventKind::Transition, event, payload, state_update));
    }

    /// `log_snapshot(state, reason, payload)` (spec §4.9).
    pub fn log_snapshot(&self, state: &SessionState, reason: impl Into<String>, payload: serde_json::Value) {
        self.record(Self::event(state, EventKind::Snapshot, reason, payload, None));
    }

    /// Ensures `session_id`'s events are present in memory, loading its
    /// `.jsonl` file from disk if this process has not seen the session
    /// yet (e.g. after a restart).
    async fn ensure_loaded(&self, session_id: &SessionId) -> Result<()> {
        if self.memory.contains_key(session_id) {
            return Ok(());
        }
        let path = session_log_path(&self.root_dir, session_id);
        let Ok(contents) = tokio::fs::read_to_string(&path).await else {
            self.memory.insert(session_id.clone(), Vec::new());
            return Ok(());
        };
        let mut events = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<TimeTravelEvent>(line)?);
        }
        self.memory.insert(session_id.clone(), events);
        Ok(())
    }

    /// `replay(session_id, cycle_id) → [event]` (spec §4.9).
    pub async fn replay(&self, session_id: &SessionId, cycle_id: u64) -> Result<Vec<TimeTravelEvent>> {
        self.ensure_loaded(session_id).await?;
        Ok(self
            .memory
            .get(session_id)
            .map(|events| events.iter().filter(|e| e.cycle_id == cycle_id).cloned().collect())
            .unwrap_or_default())
    }

    /// `diff(session_id, cycle_a, cycle_b) → {token_delta, tool_calls_delta,
    /// stage_delta, status_changes[]}` (spec §4.9).
    pub async fn diff(&self, session_id: &SessionId, cycle_a: u64, cycle_b: u64) -> Result<CycleDiff> {
        let a = self.replay(session_id, cycle_a).await?;
        let b = self.replay(session_id, cycle_b).await?;
        Ok(CycleDiff::compute(&a, &b))
    }
}
