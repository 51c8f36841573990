//! C11 — Fleet Controller: spawns/tears down agent processes over the
//! agent registry (C3), refusing to remove a hotpath-resident agent
//! without an explicit force.

mod controller;
mod error;
mod launcher;

pub use controller::{DeleteOutcome, FleetController};
pub use error::{FleetError, Result};
pub use launcher::{AgentProcessLauncher, AgentProfile, NullLauncher, ProcessHandle, SpawnSpec, TokioProcessLauncher};
