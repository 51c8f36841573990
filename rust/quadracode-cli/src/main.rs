//! Entry point binary for Quadracode. Grounded on the teacher's
//! `knhk-cli`/`knhk-sidecar::main` split: one binary, subcommands picking
//! which long-lived process to become, configuration and tracing
//! initialized once up front before any component is constructed.
//!
//! Three subcommands, one per externally-visible process shape named in
//! spec §2/§4.11:
//!   - `run`: one agent process (C10's runtime loop) under a profile.
//!   - `registry serve`: the agent registry's HTTP surface (C3).
//!   - `fleet <op>`: a one-shot client over C11's spawn/teardown gate.

mod fleet_cmd;
mod registry_cmd;
mod run_cmd;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quadracode", about = "Quadracode orchestration runtime", version)]
struct Cli {
    /// Path to a TOML config file overlaying compiled-in defaults, itself
    /// overridden by `QUADRACODE_`-prefixed environment variables.
    #[arg(long, global = true, env = "QUADRACODE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent process: a long-lived runtime loop under a profile.
    Run(run_cmd::RunArgs),
    /// Operate the agent registry (C3).
    #[command(subcommand)]
    Registry(registry_cmd::RegistryCommand),
    /// Drive the fleet controller (C11) as a one-shot client.
    #[command(subcommand)]
    Fleet(fleet_cmd::FleetCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = quadracode_otel::init_tracing() {
        eprintln!("warning: tracing already initialized: {err}");
    }

    let config = match quadracode_types::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("warning: failed to load configuration ({err}), using defaults");
            quadracode_types::Config::default()
        }
    };

    let result = match cli.command {
        Command::Run(args) => run_cmd::execute(args, config).await,
        Command::Registry(cmd) => registry_cmd::execute(cmd, config).await,
        Command::Fleet(cmd) => fleet_cmd::execute(cmd, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
