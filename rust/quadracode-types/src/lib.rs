//! Core data model for the Quadracode runtime.
//!
//! This crate has no I/O: it defines the wire envelope, the durable session
//! state owned by a single logical conversation, and the process-wide
//! configuration struct. Every other crate in the workspace builds on these
//! types rather than redefining them, the way `knhk-autonomic::types` is the
//! single source of truth for that crate's records.

pub mod config;
pub mod envelope;
pub mod error;
pub mod session;

pub use config::Config;
pub use envelope::{Envelope, Payload, PayloadFields};
pub use error::{TypesError, Result};
pub use session::{
    AgentRecord, AgentStatus, AutonomyCounters, CritiqueEntry, ExhaustionMode, ExhaustionState,
    InvariantState, ProcessedEnvelopeRing, PrpPhase, RefinementLedgerEntry, RefinementStatus,
    SegmentId, SegmentKind, SessionId, SessionState, SnapshotRecord, TokenUsage, WorkspaceDescriptor,
};
