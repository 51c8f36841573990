//! C11 — Fleet Controller (spec §4.11): spawns and tears down agent
//! processes, consulting the agent registry (C3) before every teardown so a
//! hotpath-resident agent is never removed silently. Grounded on
//! `knhk-sidecar`'s client/server split: the controller is pure client-side
//! orchestration over `RegistryClient`, the way `knhk-sidecar::client`
//! drives the sidecar's own HTTP surface without embedding server logic.

use std::time::Duration;

use dashmap::DashMap;
use quadracode_registry::RegistryClient;
use quadracode_types::AgentRecord;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{info, instrument, warn};

use crate::error::{FleetError, Result};
use crate::launcher::{AgentProcessLauncher, AgentProfile, ProcessHandle, SpawnSpec};

/// Result of a `delete_agent` call: the spec's "return `{success=false,
/// error=hotpath_agent}`, never proceed silently" contract made explicit in
/// the type rather than folded into the error channel, since a hotpath
/// refusal is an expected outcome, not a failure to execute the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl DeleteOutcome {
    fn ok() -> Self {
        Self { success: true, error: None }
    }

    fn hotpath_refused() -> Self {
        Self { success: false, error: Some("hotpath_agent".to_string()) }
    }
}

/// Polling cadence while waiting for a spawned agent to register+heartbeat.
const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct FleetController {
    registry: RegistryClient,
    launcher: Box<dyn AgentProcessLauncher>,
    registry_url: String,
    handles: DashMap<String, ProcessHandle>,
}

impl FleetController {
    pub fn new(registry: RegistryClient, launcher: Box<dyn AgentProcessLauncher>, registry_url: impl Into<String>) -> Self {
        Self { registry, launcher, registry_url: registry_url.into(), handles: DashMap::new() }
    }

    /// `spawn_agent(agent_id, profile, timeout)` (spec §4.11): launch the
    /// external process, then wait for its own `register`+`heartbeat`
    /// against C3 within `timeout` before reporting success.
    #[instrument(skip(self))]
    pub async fn spawn_agent(&self, agent_id: &str, profile: AgentProfile, timeout: Duration) -> Result<AgentRecord> {
        let spec = SpawnSpec { agent_id: agent_id.to_string(), profile, registry_url: self.registry_url.clone() };
        let handle = self.launcher.spawn(spec).await?;
        self.handles.insert(agent_id.to_string(), handle);

        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(record) = self.registry.get(agent_id).await {
                info!(agent_id, "agent registered and confirmed live");
                return Ok(record);
            }
            if Instant::now() >= deadline {
                warn!(agent_id, "agent did not register within spawn timeout");
                return Err(FleetError::SpawnTimeout(agent_id.to_string()));
            }
            sleep(SPAWN_POLL_INTERVAL).await;
        }
    }

    /// `delete_agent(agent_id, force)` (spec §4.11): must consult C3 first;
    /// a hotpath-resident agent is refused rather than torn down silently.
    #[instrument(skip(self))]
    pub async fn delete_agent(&self, agent_id: &str, force: bool) -> Result<DeleteOutcome> {
        let record = self.registry.get(agent_id).await?;
        if record.hotpath && !force {
            return Ok(DeleteOutcome::hotpath_refused());
        }

        self.registry.remove(agent_id, force).await?;
        if let Some((_, handle)) = self.handles.remove(agent_id) {
            self.launcher.kill(handle).await?;
        }
        Ok(DeleteOutcome::ok())
    }

    pub async fn list(&self, healthy_only: bool, hotpath_only: bool) -> Result<Vec<AgentRecord>> {
        Ok(self.registry.list(healthy_only, hotpath_only).await?)
    }

    pub async fn status(&self, agent_id: &str) -> Result<AgentRecord> {
        Ok(self.registry.get(agent_id).await?)
    }

    pub async fn mark_hotpath(&self, agent_id: &str) -> Result<AgentRecord> {
        Ok(self.registry.set_hotpath(agent_id, true).await?)
    }

    pub async fn clear_hotpath(&self, agent_id: &str) -> Result<AgentRecord> {
        Ok(self.registry.set_hotpath(agent_id, false).await?)
    }

    pub async fn list_hotpath(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.registry.list(false, true).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::NullLauncher;
    use quadracode_registry::RegisterRequest;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent_json(agent_id: &str, hotpath: bool) -> serde_json::Value {
        serde_json::json!({
            "agent_id": agent_id, "host": "127.0.0.1", "port": 9000, "status": "healthy",
            "registered_at": "2026-01-01T00:00:00Z", "last_heartbeat": "2026-01-01T00:00:00Z",
            "hotpath": hotpath
        })
    }

    async fn controller(server: &MockServer) -> FleetController {
        let client = RegistryClient::new(server.uri(), Duration::from_secs(2));
        FleetController::new(client, Box::new(NullLauncher), server.uri())
    }

    #[tokio::test]
    async fn spawn_agent_succeeds_once_registered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("a1", false)))
            .mount(&server)
            .await;

        let controller = controller(&server).await;
        let record = controller.spawn_agent("a1", AgentProfile::Worker, Duration::from_secs(2)).await.unwrap();
        assert_eq!(record.agent_id, "a1");
    }

    #[tokio::test]
    async fn spawn_agent_times_out_if_never_registered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let controller = controller(&server).await;
        let err = controller.spawn_agent("ghost", AgentProfile::Worker, Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, FleetError::SpawnTimeout(_)));
    }

    #[tokio::test]
    async fn delete_agent_refuses_hotpath_without_force() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/hot1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("hot1", true)))
            .mount(&server)
            .await;

        let controller = controller(&server).await;
        let outcome = controller.delete_agent("hot1", false).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("hotpath_agent"));
    }

    #[tokio::test]
    async fn delete_agent_succeeds_for_non_hotpath() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("a1", false)))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/agents/a1$"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let controller = controller(&server).await;
        let outcome = controller.delete_agent("a1", false).await.unwrap();
        assert!(outcome.success);
        let _ = RegisterRequest { agent_id: "a1".into(), host: "h".into(), port: 1, hotpath: None };
    }
}
