//! `quadracode fleet <op>`: a one-shot client over the fleet controller
//! (C11, spec §4.11). Each invocation builds a [`FleetController`] against
//! the configured registry and runs exactly one operation, printing the
//! result as JSON — the orchestrator's own tool-call path drives
//! `FleetController` in-process; this subcommand is the operator-facing
//! equivalent for debugging a running fleet.

use std::time::Duration;

use clap::{Args, Subcommand};
use quadracode_fleet::{FleetController, TokioProcessLauncher};
use quadracode_registry::RegistryClient;
use quadracode_types::Config;

use crate::run_cmd::Profile;

#[derive(Subcommand)]
pub enum FleetCommand {
    /// Launch a new agent process and wait for it to register+heartbeat.
    Spawn(SpawnArgs),
    /// Tear down an agent; refused with `hotpath_agent` unless `--force`.
    Delete(DeleteArgs),
    /// List registered agents.
    List(ListArgs),
    /// Show one agent's record.
    Status(AgentIdArgs),
    MarkHotpath(AgentIdArgs),
    ClearHotpath(AgentIdArgs),
    ListHotpath,
}

#[derive(Args)]
pub struct SpawnArgs {
    #[arg(long)]
    agent_id: String,
    #[arg(long, value_enum)]
    profile: Profile,
    #[arg(long, default_value_t = 30)]
    timeout_s: u64,
}

#[derive(Args)]
pub struct DeleteArgs {
    #[arg(long)]
    agent_id: String,
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long, default_value_t = false)]
    healthy_only: bool,
    #[arg(long, default_value_t = false)]
    hotpath_only: bool,
}

#[derive(Args)]
pub struct AgentIdArgs {
    #[arg(long)]
    agent_id: String,
}

fn controller(config: &Config) -> FleetController {
    let registry_client = RegistryClient::new(config.registry_url.clone(), Duration::from_secs(config.registry_timeout_s));
    let binary_path = std::env::current_exe().map(|p| p.display().to_string()).unwrap_or_else(|_| "quadracode".to_string());
    FleetController::new(registry_client, Box::new(TokioProcessLauncher { binary_path }), config.registry_url.clone())
}

fn print_json(value: impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn execute(cmd: FleetCommand, config: Config) -> anyhow::Result<()> {
    let controller = controller(&config);
    match cmd {
        FleetCommand::Spawn(args) => {
            let record = controller.spawn_agent(&args.agent_id, args.profile.as_fleet_profile(), Duration::from_secs(args.timeout_s)).await?;
            print_json(record)
        }
        FleetCommand::Delete(args) => {
            let outcome = controller.delete_agent(&args.agent_id, args.force).await?;
            print_json(outcome)
        }
        FleetCommand::List(args) => {
            let agents = controller.list(args.healthy_only, args.hotpath_only).await?;
            print_json(agents)
        }
        FleetCommand::Status(args) => {
            let record = controller.status(&args.agent_id).await?;
            print_json(record)
        }
        FleetCommand::MarkHotpath(args) => {
            let record = controller.mark_hotpath(&args.agent_id).await?;
            print_json(record)
        }
        FleetCommand::ClearHotpath(args) => {
            let record = controller.clear_hotpath(&args.agent_id).await?;
            print_json(record)
        }
        FleetCommand::ListHotpath => {
            let agents = controller.list_hotpath().await?;
            print_json(agents)
        }
    }
}
