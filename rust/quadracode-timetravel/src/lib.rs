//! Time-Travel Recorder (C9): an append-only per-session event log under
//! `time_travel/<session_id>.jsonl`, plus replay and cross-cycle diff.
//! Grounded on `knhk-autonomous-loop::audit_trail::AuditTrail`'s
//! in-memory-plus-file-log split, generalized to one file per session and
//! a fire-and-forget `mpsc` writer so logging never blocks the runtime
//! loop (spec §4.9). The teacher's Ed25519 signing and blockchain-style
//! `previous_hash` chaining are dropped: nothing in spec requires the log
//! to be tamper-evident, only append-only and replayable.

pub mod diff;
pub mod error;
pub mod event;
pub mod recorder;

pub use diff::CycleDiff;
pub use error::{Result, TimeTravelError};
pub use event::{EventKind, TimeTravelEvent};
pub use recorder::TimeTravelRecorder;
