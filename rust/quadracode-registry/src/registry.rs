//! C3 — Agent Registry (spec §4.3): agent identity, liveness, and hotpath
//! gating, grounded on `knhk-sidecar::health::HealthChecker`'s component
//! map, generalized from infrastructure components to registered agents.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quadracode_types::{AgentRecord, AgentStatus};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Upsert payload for `register`. `hotpath: None` leaves an existing flag
/// untouched; `Some(false)` explicitly clears it (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub agent_id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub hotpath: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    pub status: AgentStatus,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub healthy_only: bool,
    #[serde(default)]
    pub hotpath_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub last_updated: DateTime<Utc>,
}

/// The agent health timeout used by `is_healthy`. Defaults to the spec's
/// 45 second default; callers construct [`Registry`] with the configured
/// value from `quadracode_types::Config::agent_health_timeout_s`.
#[derive(Debug, Clone, Copy)]
pub struct HealthTimeout(pub i64);

impl Default for HealthTimeout {
    fn default() -> Self {
        Self(45)
    }
}

fn is_healthy(record: &AgentRecord, timeout: HealthTimeout, now: DateTime<Utc>) -> bool {
    record.status == AgentStatus::Healthy
        && now.signed_duration_since(record.last_heartbeat).num_seconds() <= timeout.0
}

/// In-process agent registry. A `sled`-backed variant is unnecessary:
/// liveness state is inherently ephemeral (an agent that restarts
/// re-registers), so the registry never needs to survive a process
/// restart — spec §4.3 never requires registry durability, unlike C1/C2.
pub struct Registry {
    agents: DashMap<String, AgentRecord>,
    timeout: HealthTimeout,
}

impl Registry {
    pub fn new(timeout: HealthTimeout) -> Self {
        Self { agents: DashMap::new(), timeout }
    }

    pub fn register(&self, req: RegisterRequest) -> AgentRecord {
        let now = Utc::now();
        let hotpath = match self.agents.get(&req.agent_id) {
            Some(existing) => req.hotpath.unwrap_or(existing.hotpath),
            None => req.hotpath.unwrap_or(false),
        };
        let record = AgentRecord {
            agent_id: req.agent_id.clone(),
            host: req.host,
            port: req.port,
            status: AgentStatus::Healthy,
            registered_at: self
                .agents
                .get(&req.agent_id)
                .map(|r| r.registered_at)
                .unwrap_or(now),
            last_heartbeat: now,
            hotpath,
        };
        self.agents.insert(req.agent_id, record.clone());
        record
    }

    pub fn heartbeat(&self, req: HeartbeatRequest) -> Result<AgentRecord> {
        let mut entry = self
            .agents
            .get_mut(&req.agent_id)
            .ok_or_else(|| RegistryError::UnknownAgent(req.agent_id.clone()))?;
        entry.status = req.status;
        entry.last_heartbeat = req.reported_at;
        Ok(entry.clone())
    }

    pub fn list(&self, filter: ListFilter) -> Vec<AgentRecord> {
        let now = Utc::now();
        self.agents
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|a| !filter.healthy_only || is_healthy(a, self.timeout, now))
            .filter(|a| !filter.hotpath_only || a.hotpath)
            .collect()
    }

    pub fn get(&self, agent_id: &str) -> Result<AgentRecord> {
        self.agents
            .get(agent_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.to_string()))
    }

    pub fn set_hotpath(&self, agent_id: &str, hotpath: bool) -> Result<AgentRecord> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.to_string()))?;
        entry.hotpath = hotpath;
        Ok(entry.clone())
    }

    /// Remove an agent. Fails with [`RegistryError::HotpathAgent`] unless
    /// `force` is set, so callers (the fleet controller) never silently
    /// tear down a hotpath-resident agent.
    pub fn remove(&self, agent_id: &str, force: bool) -> Result<()> {
        let record = self.get(agent_id)?;
        if record.hotpath && !force {
            return Err(RegistryError::HotpathAgent);
        }
        self.agents.remove(agent_id);
        Ok(())
    }

    pub fn stats(&self) -> RegistryStats {
        let now = Utc::now();
        let mut healthy = 0usize;
        let mut unhealthy = 0usize;
        for entry in self.agents.iter() {
            if is_healthy(entry.value(), self.timeout, now) {
                healthy += 1;
            } else {
                unhealthy += 1;
            }
        }
        RegistryStats {
            total: self.agents.len(),
            healthy,
            unhealthy,
            last_updated: now,
        }
    }

    pub fn is_agent_healthy(&self, agent_id: &str) -> bool {
        let now = Utc::now();
        self.agents
            .get(agent_id)
            .map(|entry| is_healthy(entry.value(), self.timeout, now))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str) -> RegisterRequest {
        RegisterRequest { agent_id: id.to_string(), host: "127.0.0.1".to_string(), port: 9000, hotpath: None }
    }

    #[test]
    fn register_is_idempotent_and_preserves_hotpath() {
        let registry = Registry::new(HealthTimeout::default());
        registry.register(req("a1"));
        registry.set_hotpath("a1", true).unwrap();

        // Re-register without an explicit hotpath must preserve it.
        registry.register(req("a1"));
        assert!(registry.get("a1").unwrap().hotpath);
    }

    #[test]
    fn explicit_hotpath_clear_on_register_overrides() {
        let registry = Registry::new(HealthTimeout::default());
        registry.register(req("a1"));
        registry.set_hotpath("a1", true).unwrap();

        registry.register(RegisterRequest { hotpath: Some(false), ..req("a1") });
        assert!(!registry.get("a1").unwrap().hotpath);
    }

    #[test]
    fn remove_hotpath_agent_without_force_fails() {
        let registry = Registry::new(HealthTimeout::default());
        registry.register(req("a1"));
        registry.set_hotpath("a1", true).unwrap();

        let err = registry.remove("a1", false).unwrap_err();
        assert!(matches!(err, RegistryError::HotpathAgent));
        assert!(registry.remove("a1", true).is_ok());
    }

    #[test]
    fn heartbeat_on_unknown_agent_errors() {
        let registry = Registry::new(HealthTimeout::default());
        let err = registry
            .heartbeat(HeartbeatRequest { agent_id: "ghost".into(), status: AgentStatus::Healthy, reported_at: Utc::now() })
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAgent(_)));
    }

    #[test]
    fn stats_count_healthy_and_unhealthy() {
        let registry = Registry::new(HealthTimeout::default());
        registry.register(req("a1"));
        registry.register(req("a2"));
        registry
            .heartbeat(HeartbeatRequest { agent_id: "a2".into(), status: AgentStatus::Unhealthy, reported_at: Utc::now() })
            .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.healthy, 1);
        assert_eq!(stats.unhealthy, 1);
    }
}
