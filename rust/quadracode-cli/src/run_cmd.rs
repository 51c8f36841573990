//! `quadracode run`: start one agent process's runtime loop (C10), wiring
//! every other component from CLI flags and the loaded [`Config`]. Mirrors
//! the teacher's `knhk-sidecar::main`'s "parse a handful of env-backed
//! settings, build a config struct, start the long-running thing" shape.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use quadracode_fabric::{CheckpointStore, InMemoryCheckpointStore, InMemoryMailbox, Mailbox, SledCheckpointStore, SledMailbox};
use quadracode_fleet::AgentProfile;
use quadracode_otel::Emitter;
use quadracode_registry::{HealthTimeout, HeartbeatRequest, RegisterRequest, Registry, RegistryClient};
use quadracode_runtime::{EchoToolExecutor, RuntimeLoop, RuntimeLoopDeps};
use quadracode_timetravel::TimeTravelRecorder;
use quadracode_types::{AgentStatus, Config};
use quadracode_workspace::WorkspaceManager;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    Orchestrator,
    Worker,
    Skeptic,
}

impl Profile {
    /// The mailbox recipient name this profile reads from (spec §6:
    /// `mailbox/<recipient>` with recipient in `{human, skeptic,
    /// orchestrator, agent-<id>}`).
    fn recipient(self, agent_id: &str) -> String {
        match self {
            Profile::Orchestrator => "orchestrator".to_string(),
            Profile::Skeptic => "skeptic".to_string(),
            Profile::Worker => format!("agent-{agent_id}"),
        }
    }

    pub fn as_fleet_profile(self) -> AgentProfile {
        match self {
            Profile::Orchestrator => AgentProfile::Orchestrator,
            Profile::Worker => AgentProfile::Worker,
            Profile::Skeptic => AgentProfile::Skeptic,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Which of the three runtime roles this process plays.
    #[arg(long, value_enum)]
    profile: Profile,

    /// Stable identity this process registers under (C3). For
    /// `--profile worker` this also names the mailbox: `agent-<id>`.
    #[arg(long, env = "QUADRACODE_AGENT_ID")]
    agent_id: String,

    /// Host this agent reports to the registry; informational, not bound to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Agent registry base URL (overrides the loaded config).
    #[arg(long, env = "QUADRACODE_REGISTRY_URL")]
    registry_url: Option<String>,

    /// The skeptic's mailbox recipient name, so the runtime loop knows
    /// whose inbound envelopes are skeptic triggers (spec §4.7) and where
    /// false-stop routing (spec §4.6) sends its message.
    #[arg(long, default_value = "skeptic")]
    skeptic_recipient: String,

    /// Directory for a durable `sled` mailbox. Omit for an in-memory
    /// mailbox (single-process testing only — not durable across restarts).
    #[arg(long)]
    mailbox_dir: Option<String>,

    #[arg(long)]
    checkpoint_dir: Option<String>,

    /// Root directory workspace snapshots are archived under.
    #[arg(long, default_value = "workspace_snapshots")]
    workspace_dir: String,

    /// Automatically restore on detected drift (spec §4.8).
    #[arg(long, default_value_t = false)]
    auto_restore: bool,

    #[arg(long)]
    time_travel_dir: Option<String>,

    /// Register with the agent registry as hotpath-resident.
    #[arg(long, default_value_t = false)]
    hotpath: bool,
}

pub async fn execute(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let recipient = args.profile.recipient(&args.agent_id);
    let registry_url = args.registry_url.clone().unwrap_or_else(|| config.registry_url.clone());

    let mailbox: Arc<dyn Mailbox> = match &args.mailbox_dir {
        Some(dir) => Arc::new(SledMailbox::open(dir)?),
        None => Arc::new(InMemoryMailbox::new()),
    };
    let checkpoints: Arc<dyn CheckpointStore> = match &args.checkpoint_dir {
        Some(dir) => Arc::new(SledCheckpointStore::open(dir)?),
        None => Arc::new(InMemoryCheckpointStore::new()),
    };

    let local_registry = Arc::new(Registry::new(HealthTimeout(config.agent_health_timeout_s as i64)));
    let registry_client = RegistryClient::new(registry_url.clone(), Duration::from_secs(config.registry_timeout_s));

    let registered = registry_client
        .register(&RegisterRequest { agent_id: args.agent_id.clone(), host: args.host.clone(), port: args.port, hotpath: if args.hotpath { Some(true) } else { None } })
        .await?;
    local_registry.register(RegisterRequest { agent_id: registered.agent_id.clone(), host: registered.host, port: registered.port, hotpath: Some(registered.hotpath) });
    info!(agent_id = %args.agent_id, recipient = %recipient, hotpath = registered.hotpath, "registered with agent registry");

    spawn_heartbeat_loop(args.agent_id.clone(), registry_client, local_registry.clone(), Duration::from_secs(config.heartbeat_interval_s));

    let workspace = WorkspaceManager::new(PathBuf::from(&args.workspace_dir), args.auto_restore);
    let time_travel_dir = args.time_travel_dir.unwrap_or_else(|| config.time_travel_dir.clone());
    let recorder = Arc::new(TimeTravelRecorder::new(PathBuf::from(time_travel_dir)));

    let deps = RuntimeLoopDeps {
        mailbox,
        checkpoints,
        registry: local_registry,
        llm: Arc::new(quadracode_context::NullLlmDriver),
        governor: Arc::new(quadracode_context::HeuristicGovernor),
        scorer: Arc::new(quadracode_context::HeuristicScorer),
        workspace: Arc::new(workspace),
        recorder,
        emitter: Arc::new(Emitter::new()),
        tool_executor: Arc::new(EchoToolExecutor),
    };

    let runtime = RuntimeLoop::new(recipient.clone(), args.skeptic_recipient, deps, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    info!(recipient = %recipient, "runtime loop starting");
    runtime.run(shutdown_rx).await?;
    info!(recipient = %recipient, "runtime loop stopped");
    Ok(())
}

/// Keeps the registry's view of this agent alive, and mirrors the
/// registry's current agent set into the process-local [`Registry`] the
/// runtime loop's hotpath probe (spec §4.6) reads from, so a process
/// running `--profile worker` still sees the orchestrator's hotpath flags
/// without embedding the HTTP client into `quadracode-context` itself.
fn spawn_heartbeat_loop(agent_id: String, client: RegistryClient, mirror: Arc<Registry>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(err) = client.heartbeat(&HeartbeatRequest { agent_id: agent_id.clone(), status: AgentStatus::Healthy, reported_at: chrono::Utc::now() }).await {
                warn!(error = %err, "heartbeat to agent registry failed");
            }
            match client.list(false, false).await {
                Ok(agents) => {
                    for agent in agents {
                        mirror.register(RegisterRequest { agent_id: agent.agent_id, host: agent.host, port: agent.port, hotpath: Some(agent.hotpath) });
                    }
                }
                Err(err) => warn!(error = %err, "failed to mirror registry agent list"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_recipient_is_namespaced_by_agent_id() {
        assert_eq!(Profile::Worker.recipient("w1"), "agent-w1");
    }

    #[test]
    fn orchestrator_and_skeptic_recipients_are_fixed_names() {
        assert_eq!(Profile::Orchestrator.recipient("anything"), "orchestrator");
        assert_eq!(Profile::Skeptic.recipient("anything"), "skeptic");
    }

    #[test]
    fn profile_maps_onto_the_fleet_controller_s_profile_enum() {
        assert_eq!(Profile::Worker.as_fleet_profile(), AgentProfile::Worker);
    }
}
