//! Process-wide configuration (spec §6).
//!
//! Loaded once at startup and handed explicitly to components — init, then
//! immutable (spec §9 redesign flag for the "central observer singleton").
//! Layered the way the teacher's workspace loads configuration: compiled-in
//! defaults, then an optional TOML file, then environment variables
//! prefixed `QUADRACODE_` (double-underscore nested, e.g.
//! `QUADRACODE_REGISTRY_URL`).

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuratorMode {
    Heuristic,
    Llm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerMode {
    Heuristic,
    Llm,
}

/// The single config struct named in spec §6, all fields overridable by
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub context_window_max: u64,
    pub optimal_context_size: u64,
    pub messages_budget_ratio: f64,
    pub min_compress_count: usize,
    pub retention_count: usize,
    pub max_tool_payload_chars: usize,
    pub governor_max_segments: usize,
    pub quality_threshold: f64,
    pub critical_priority: u8,
    pub reducer_model: String,
    pub curator_mode: CuratorMode,
    pub scorer_mode: ScorerMode,
    pub registry_url: String,
    pub registry_timeout_s: u64,
    pub heartbeat_interval_s: u64,
    pub agent_health_timeout_s: u64,
    pub snapshot_retention: usize,
    pub externalize_write_enabled: bool,
    pub time_travel_dir: String,
    pub autonomous_max_iterations: u64,
    pub autonomous_runtime_ceiling_s: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_window_max: 200_000,
            optimal_context_size: 120_000,
            messages_budget_ratio: 0.6,
            min_compress_count: 40,
            retention_count: 10,
            max_tool_payload_chars: 8_000,
            governor_max_segments: 24,
            quality_threshold: 0.6,
            critical_priority: 9,
            reducer_model: "reducer-default".to_string(),
            curator_mode: CuratorMode::Heuristic,
            scorer_mode: ScorerMode::Heuristic,
            registry_url: "http://127.0.0.1:7630".to_string(),
            registry_timeout_s: 5,
            heartbeat_interval_s: 15,
            agent_health_timeout_s: 45,
            snapshot_retention: 5,
            externalize_write_enabled: true,
            time_travel_dir: "time_travel".to_string(),
            autonomous_max_iterations: 500,
            autonomous_runtime_ceiling_s: 3600,
        }
    }
}

impl Config {
    pub fn messages_budget(&self) -> u64 {
        (self.optimal_context_size as f64 * self.messages_budget_ratio) as u64
    }

    /// Load layered configuration: defaults, then an optional TOML file,
    /// then `QUADRACODE_`-prefixed environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Config::default();
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&defaults)?,
        );

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("QUADRACODE")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build()?;
        Ok(built.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = Config::default();
        assert!(cfg.messages_budget() < cfg.optimal_context_size);
        assert!(cfg.optimal_context_size < cfg.context_window_max);
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("QUADRACODE_RETENTION_COUNT", "3");
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.retention_count, 3);
        std::env::remove_var("QUADRACODE_RETENTION_COUNT");
    }
}
