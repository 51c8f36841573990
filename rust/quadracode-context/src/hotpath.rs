//! Hotpath residency probe (spec §4.6): before each cycle, query C3 for the
//! set of `hotpath=true` agents; any that are not healthy emit a telemetry
//! event and cause no state change.

use quadracode_registry::{ListFilter, Registry};

/// Returns the agent ids of any hotpath-flagged agent that is currently
/// unhealthy. An empty vec means every hotpath agent is healthy.
pub fn hotpath_violations(registry: &Registry) -> Vec<String> {
    registry
        .list(ListFilter { healthy_only: false, hotpath_only: true })
        .into_iter()
        .filter(|agent| !registry.is_agent_healthy(&agent.agent_id))
        .map(|agent| agent.agent_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quadracode_registry::{HealthTimeout, HeartbeatRequest, RegisterRequest};
    use quadracode_types::AgentStatus;

    #[test]
    fn healthy_hotpath_agent_has_no_violation() {
        let registry = Registry::new(HealthTimeout::default());
        registry.register(RegisterRequest { agent_id: "a1".into(), host: "h".into(), port: 1, hotpath: Some(true) });
        assert!(hotpath_violations(&registry).is_empty());
    }

    #[test]
    fn unhealthy_hotpath_agent_is_reported_without_state_change() {
        let registry = Registry::new(HealthTimeout::default());
        registry.register(RegisterRequest { agent_id: "a1".into(), host: "h".into(), port: 1, hotpath: Some(true) });
        registry
            .heartbeat(HeartbeatRequest { agent_id: "a1".into(), status: AgentStatus::Unhealthy, reported_at: Utc::now() })
            .unwrap();

        let violations = hotpath_violations(&registry);
        assert_eq!(violations, vec!["a1".to_string()]);
        // Still listed, still hotpath — never removed by the probe.
        assert!(registry.get("a1").unwrap().hotpath);
    }
}
