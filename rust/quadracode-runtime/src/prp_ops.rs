//! Maps a driver turn's recognized tool calls onto C4 ledger/FSM operations
//! (spec §4.4's `propose_hypothesis`/`conclude_hypothesis` and the guarded
//! `transition`). Grounded on `knhk-autonomic::execute::ExecutionComponent`'s
//! plan-to-action dispatch shape: a fixed set of named actions, each mapped
//! to one call into the underlying component, unrecognized or malformed
//! calls left for the ordinary tool-execution path.
//!
//! A call that fails (novelty-blocked, unknown cycle, invalid transition)
//! does not abort the turn: it is recorded to the session's violation log
//! and the turn continues, the same "invariant violation surfaced as
//! telemetry, does not fail the runtime" posture spec §7 takes for PRP
//! transition failures generally.

use quadracode_context::ToolCall;
use quadracode_prp::TransitionMode;
use quadracode_types::{PrpPhase, RefinementStatus, SessionState};
use tracing::warn;

pub const PROPOSE_HYPOTHESIS: &str = "propose_hypothesis";
pub const CONCLUDE_HYPOTHESIS: &str = "conclude_hypothesis";
pub const ADVANCE_PRP: &str = "advance_prp";

fn parse_phase(value: &str) -> Option<PrpPhase> {
    match value {
        "hypothesize" => Some(PrpPhase::Hypothesize),
        "execute" => Some(PrpPhase::Execute),
        "test" => Some(PrpPhase::Test),
        "conclude" => Some(PrpPhase::Conclude),
        "propose" => Some(PrpPhase::Propose),
        _ => None,
    }
}

fn parse_status(value: &str) -> Option<RefinementStatus> {
    match value {
        "succeeded" => Some(RefinementStatus::Succeeded),
        "failed" => Some(RefinementStatus::Failed),
        "rejected" => Some(RefinementStatus::Rejected),
        _ => None,
    }
}

fn record_violation(state: &mut SessionState, detail: impl Into<String>) {
    let detail = detail.into();
    warn!(detail = %detail, "prp tool call rejected");
    state.invariants.violation_log.push(detail);
}

fn dispatch_propose(state: &mut SessionState, call: &ToolCall) {
    let Some(hypothesis) = call.arguments.get("hypothesis").and_then(|v| v.as_str()) else {
        return record_violation(state, "propose_hypothesis missing `hypothesis`");
    };
    let strategy = call.arguments.get("strategy").and_then(|v| v.as_str()).map(str::to_string);
    let dependencies = call
        .arguments
        .get("dependencies")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect())
        .unwrap_or_default();
    let differentiation_note = call.arguments.get("differentiation_note").and_then(|v| v.as_str());

    if let Err(err) = quadracode_prp::propose_hypothesis(state, hypothesis, strategy, dependencies, differentiation_note) {
        record_violation(state, format!("propose_hypothesis rejected: {err}"));
    }
}

fn dispatch_conclude(state: &mut SessionState, call: &ToolCall) {
    let Some(cycle_id) = call.arguments.get("cycle_id").and_then(|v| v.as_u64()) else {
        return record_violation(state, "conclude_hypothesis missing `cycle_id`");
    };
    let Some(status) = call.arguments.get("status").and_then(|v| v.as_str()).and_then(parse_status) else {
        return record_violation(state, "conclude_hypothesis missing or unknown `status`");
    };
    let outcome_summary = call.arguments.get("outcome_summary").and_then(|v| v.as_str()).unwrap_or_default();
    let test_results = call.arguments.get("test_results").cloned();

    if let Err(err) = quadracode_prp::conclude_hypothesis(state, cycle_id, status, outcome_summary, test_results) {
        record_violation(state, format!("conclude_hypothesis rejected: {err}"));
    }
}

fn dispatch_advance(state: &mut SessionState, call: &ToolCall) {
    let Some(to) = call.arguments.get("to").and_then(|v| v.as_str()).and_then(parse_phase) else {
        return record_violation(state, "advance_prp missing or unknown `to`");
    };
    let mode = match call.arguments.get("mode").and_then(|v| v.as_str()) {
        Some("lenient") => TransitionMode::Lenient,
        _ => TransitionMode::Strict,
    };

    if let Err(err) = quadracode_prp::transition(state, to, mode, false) {
        record_violation(state, format!("advance_prp rejected: {err}"));
    }
}

/// Runs every recognized PRP-control tool call in `calls` against `state`,
/// in order. Calls with an unrecognized name are left untouched for the
/// ordinary tool-execution path.
pub fn dispatch(state: &mut SessionState, calls: &[ToolCall]) {
    for call in calls {
        match call.name.as_str() {
            PROPOSE_HYPOTHESIS => dispatch_propose(state, call),
            CONCLUDE_HYPOTHESIS => dispatch_conclude(state, call),
            ADVANCE_PRP => dispatch_advance(state, call),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::SessionId;

    #[test]
    fn propose_hypothesis_tool_call_appends_a_ledger_entry() {
        let mut state = SessionState::new(SessionId::new("s-1"));
        let call = ToolCall { name: PROPOSE_HYPOTHESIS.into(), arguments: serde_json::json!({"hypothesis": "try caching the parser output"}) };
        dispatch(&mut state, &[call]);
        assert_eq!(state.ledger.len(), 1);
        assert!(state.invariants.violation_log.is_empty());
    }

    #[test]
    fn conclude_hypothesis_on_unknown_cycle_is_recorded_as_a_violation_not_a_panic() {
        let mut state = SessionState::new(SessionId::new("s-1"));
        let call = ToolCall {
            name: CONCLUDE_HYPOTHESIS.into(),
            arguments: serde_json::json!({"cycle_id": 99, "status": "succeeded", "outcome_summary": "done"}),
        };
        dispatch(&mut state, &[call]);
        assert_eq!(state.invariants.violation_log.len(), 1);
    }

    #[test]
    fn advance_prp_transitions_in_strict_mode() {
        let mut state = SessionState::new(SessionId::new("s-1"));
        state.invariants.skepticism_gate_satisfied = true;
        state.invariants.context_updated_in_cycle = true;
        let call = ToolCall { name: ADVANCE_PRP.into(), arguments: serde_json::json!({"to": "execute"}) };
        dispatch(&mut state, &[call]);
        assert_eq!(state.prp_phase, PrpPhase::Execute);
    }
}
