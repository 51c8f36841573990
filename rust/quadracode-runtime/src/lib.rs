//! The Runtime Loop (C10): the mailbox-driven per-session turn that wires
//! C1 (fabric), C2 (checkpoints), C3 (registry), C4 (PRP), C6 (context
//! engine), C7 (skeptic trigger), C8 (workspace integrity), C9
//! (time-travel) and C12 (observability) together. Grounded on
//! `knhk-autonomic::controller::AutonomicController::execute_cycle`'s
//! read-then-stage-then-commit shape.

pub mod dead_letter;
pub mod dedupe;
pub mod error;
pub mod outcome;
pub mod prp_ops;
pub mod runtime_loop;
pub mod session_lock;
pub mod tool;

pub use dead_letter::{dead_letter, exceeded_retry_budget, RetryTracker, DEAD_LETTER_RECIPIENT, MAX_RETRY_ATTEMPTS};
pub use dedupe::{already_processed, mark_processed};
pub use error::{Result, RuntimeError};
pub use outcome::EnvelopeOutcome;
pub use runtime_loop::{RuntimeLoop, RuntimeLoopDeps};
pub use session_lock::SessionLocks;
pub use tool::{EchoToolExecutor, ToolExecutor};
