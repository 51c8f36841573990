//! `quadracode registry serve`: runs the agent registry's HTTP surface
//! (C3, spec §6). Exactly one process in a deployment runs this; every
//! other process's `run` talks to it through `RegistryClient`.

use std::sync::Arc;

use clap::{Args, Subcommand};
use quadracode_registry::{HealthTimeout, Registry};
use quadracode_types::Config;

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// Serve the HTTP surface until the process is killed.
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:7630")]
    bind: String,
}

pub async fn execute(cmd: RegistryCommand, config: Config) -> anyhow::Result<()> {
    match cmd {
        RegistryCommand::Serve(args) => {
            let registry = Arc::new(Registry::new(HealthTimeout(config.agent_health_timeout_s as i64)));
            quadracode_registry::http::serve(registry, &args.bind).await?;
            Ok(())
        }
    }
}
