//! The per-session event envelope written to `time_travel/<session_id>.jsonl`
//! (spec §4.9). Grounded on `knhk-autonomous-loop::audit_trail::AuditEntry`,
//! with the Ed25519 signature and blockchain-style `previous_hash` chaining
//! dropped — spec's time-travel log carries no signature requirement.

use chrono::{DateTime, Utc};
use quadracode_types::{ExhaustionMode, PrpPhase, SessionId};
use serde::{Deserialize, Serialize};

/// What kind of thing happened (spec §4.9's `log_stage`/`log_tool`/
/// `log_transition`/`log_snapshot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Stage,
    Tool,
    Transition,
    Snapshot,
}

/// One time-travel log line (spec §4.9: `{ts, session_id, cycle_id,
/// prp_state, exhaustion_mode, event, payload}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeTravelEvent {
    pub ts: DateTime<Utc>,
    pub session_id: SessionId,
    pub cycle_id: u64,
    pub prp_state: PrpPhase,
    pub exhaustion_mode: ExhaustionMode,
    pub kind: EventKind,
    /// Name of the stage, tool, transition event, or snapshot reason.
    pub event: String,
    pub payload: serde_json::Value,
    /// Optional state delta recorded alongside the event, for replay to
    /// reconstruct intermediate state without recomputing it.
    pub state_update: Option<serde_json::Value>,
}
