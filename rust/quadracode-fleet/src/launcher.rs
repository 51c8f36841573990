//! The container/process runtime behind `spawn_agent`/`delete_agent` is an
//! external collaborator (spec §1), so the fleet controller only ever talks
//! to it through this narrow port. New logic with no single teacher
//! analogue; written in the corpus's `tokio::process`-first style for
//! spawning a child process asynchronously.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which runtime profile a spawned agent process runs under (spec §6
/// `run --profile <orchestrator|worker|skeptic>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProfile {
    Orchestrator,
    Worker,
    Skeptic,
}

impl AgentProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentProfile::Orchestrator => "orchestrator",
            AgentProfile::Worker => "worker",
            AgentProfile::Skeptic => "skeptic",
        }
    }
}

/// What `spawn_agent` hands the launcher.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub agent_id: String,
    pub profile: AgentProfile,
    pub registry_url: String,
}

/// An opaque handle the controller keeps to later `kill` a spawned process.
/// Not `Clone`: ownership of a live process handle is single-owner by design.
pub struct ProcessHandle {
    pub agent_id: String,
    child: Option<tokio::process::Child>,
}

/// The container/process runtime, abstracted (spec §1: "the container
/// runtime used to materialize workspaces" is an external collaborator).
#[async_trait]
pub trait AgentProcessLauncher: Send + Sync {
    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle>;
    async fn kill(&self, handle: ProcessHandle) -> Result<()>;
}

/// Spawns a local OS process running the `quadracode` binary (package
/// `quadracode-cli`) with `run --profile <profile> --agent-id <id>`, for
/// integration tests and
/// single-machine deployments. A real multi-host deployment would swap this
/// for a Kubernetes/Nomad-backed launcher without touching the controller.
pub struct TokioProcessLauncher {
    pub binary_path: String,
}

#[async_trait]
impl AgentProcessLauncher for TokioProcessLauncher {
    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle> {
        let child = tokio::process::Command::new(&self.binary_path)
            .arg("run")
            .arg("--profile")
            .arg(spec.profile.as_str())
            .arg("--agent-id")
            .arg(&spec.agent_id)
            .arg("--registry-url")
            .arg(&spec.registry_url)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| crate::error::FleetError::Launcher(e.to_string()))?;

        Ok(ProcessHandle { agent_id: spec.agent_id, child: Some(child) })
    }

    async fn kill(&self, mut handle: ProcessHandle) -> Result<()> {
        if let Some(mut child) = handle.child.take() {
            child.kill().await.map_err(|e| crate::error::FleetError::Launcher(e.to_string()))?;
        }
        Ok(())
    }
}

/// No-op launcher for unit tests that exercise registry-consulting logic
/// without an actual process.
#[derive(Default)]
pub struct NullLauncher;

#[async_trait]
impl AgentProcessLauncher for NullLauncher {
    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle> {
        Ok(ProcessHandle { agent_id: spec.agent_id, child: None })
    }

    async fn kill(&self, _handle: ProcessHandle) -> Result<()> {
        Ok(())
    }
}
