//! C4 — PRP guarded state machine (spec §4.4), grounded on
//! `knhk-autonomic::controller::AutonomicController`'s guarded phase
//! sequencing, generalized from a fixed five-phase MAPE-K tick to the
//! hypothesize/execute/test/conclude/propose cycle with per-transition
//! guards instead of an unconditional `loop { phase() }`.

use quadracode_types::{ExhaustionMode, InvariantState, PrpPhase, SessionState};
use tracing::{instrument, warn};

use crate::error::{PrpError, Result};

/// Whether an attempted invalid transition is rejected (`Strict`) or merely
/// logged to the session's violation log with the state left unchanged
/// (`Lenient`) — spec §4.4: "in non-strict mode, an invalid attempt is
/// recorded to the violation log and the state is left unchanged."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    Strict,
    Lenient,
}

fn guard(from: PrpPhase, to: PrpPhase, exhaustion: ExhaustionMode, invariants: &InvariantState) -> bool {
    use ExhaustionMode::*;
    use PrpPhase::*;

    match (from, to) {
        (Hypothesize, Execute) => !matches!(exhaustion, RetryDepletion | ToolBackpressure),
        (Execute, Test) => !matches!(exhaustion, ToolBackpressure),
        (Execute, Hypothesize) => matches!(exhaustion, RetryDepletion | ToolBackpressure | PredictedExhaustion),
        (Test, Conclude) => {
            !matches!(exhaustion, TestFailure | HypothesisExhausted)
                && !invariants.needs_test_after_rejection
                && invariants.context_updated_in_cycle
                && invariants.skepticism_gate_satisfied
        }
        (Test, Hypothesize) => matches!(exhaustion, TestFailure | HypothesisExhausted),
        (Conclude, Propose) => {
            !invariants.needs_test_after_rejection
                && invariants.context_updated_in_cycle
                && invariants.skepticism_gate_satisfied
        }
        (Conclude, Execute) => matches!(exhaustion, ContextSaturation | ToolBackpressure),
        // PROPOSE -> HYPOTHESIZE is gated on the caller's `skeptic_rejection`
        // flag, not on exhaustion/invariants; handled specially in `transition`.
        (Propose, Hypothesize) => true,
        _ => false,
    }
}

/// Attempt a transition on `state`. Returns `Ok(())` on success.
///
/// `skeptic_rejection` must be `true` for a `PROPOSE -> HYPOTHESIZE`
/// transition to be considered at all (spec: "only when triggered by
/// skeptic rejection"); it is ignored for all other transition pairs.
#[instrument(skip(state), fields(session_id = %state.session_id))]
pub fn transition(
    state: &mut SessionState,
    to: PrpPhase,
    mode: TransitionMode,
    skeptic_rejection: bool,
) -> Result<()> {
    let from = state.prp_phase;

    if from == PrpPhase::Propose && to == PrpPhase::Hypothesize && !skeptic_rejection {
        return reject(state, from, to, mode);
    }

    if !guard(from, to, state.exhaustion.mode, &state.invariants) {
        return reject(state, from, to, mode);
    }

    match (from, to) {
        (PrpPhase::Hypothesize, PrpPhase::Execute) => {
            state.invariants.skepticism_gate_satisfied = false;
            state.invariants.context_updated_in_cycle = false;
        }
        (PrpPhase::Propose, PrpPhase::Hypothesize) => {
            state.cycle_counter += 1;
            state.invariants.needs_test_after_rejection = true;
        }
        _ => {}
    }

    state.prp_phase = to;
    Ok(())
}

fn reject(state: &mut SessionState, from: PrpPhase, to: PrpPhase, mode: TransitionMode) -> Result<()> {
    match mode {
        TransitionMode::Strict => Err(PrpError::InvalidTransition { from, to }),
        TransitionMode::Lenient => {
            warn!(?from, ?to, "prp_invalid_transition recorded, state unchanged");
            state
                .invariants
                .violation_log
                .push(format!("prp_invalid_transition: {from:?} -> {to:?}"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::SessionId;
    use test_case::test_case;

    fn state() -> SessionState {
        SessionState::new(SessionId::new("s-1"))
    }

    #[test]
    fn hypothesize_to_execute_resets_cycle_invariants() {
        let mut s = state();
        s.invariants.skepticism_gate_satisfied = true;
        s.invariants.context_updated_in_cycle = true;
        transition(&mut s, PrpPhase::Execute, TransitionMode::Strict, false).unwrap();
        assert_eq!(s.prp_phase, PrpPhase::Execute);
        assert!(!s.invariants.skepticism_gate_satisfied);
        assert!(!s.invariants.context_updated_in_cycle);
    }

    #[test_case(ExhaustionMode::RetryDepletion)]
    #[test_case(ExhaustionMode::ToolBackpressure)]
    fn hypothesize_to_execute_blocked_by_exhaustion(mode: ExhaustionMode) {
        let mut s = state();
        s.exhaustion.set_mode(mode, 1.0, "test");
        let err = transition(&mut s, PrpPhase::Execute, TransitionMode::Strict, false).unwrap_err();
        assert!(matches!(err, PrpError::InvalidTransition { .. }));
        assert_eq!(s.prp_phase, PrpPhase::Hypothesize);
    }

    #[test]
    fn lenient_mode_records_violation_and_leaves_state() {
        let mut s = state();
        s.exhaustion.set_mode(ExhaustionMode::RetryDepletion, 1.0, "test");
        transition(&mut s, PrpPhase::Execute, TransitionMode::Lenient, false).unwrap();
        assert_eq!(s.prp_phase, PrpPhase::Hypothesize);
        assert_eq!(s.invariants.violation_log.len(), 1);
    }

    #[test]
    fn test_to_conclude_requires_all_invariants() {
        let mut s = state();
        s.prp_phase = PrpPhase::Test;
        s.invariants.context_updated_in_cycle = true;
        s.invariants.skepticism_gate_satisfied = true;
        s.invariants.needs_test_after_rejection = false;
        transition(&mut s, PrpPhase::Conclude, TransitionMode::Strict, false).unwrap();
        assert_eq!(s.prp_phase, PrpPhase::Conclude);
    }

    #[test]
    fn test_to_conclude_blocked_without_skepticism_gate() {
        let mut s = state();
        s.prp_phase = PrpPhase::Test;
        s.invariants.context_updated_in_cycle = true;
        s.invariants.skepticism_gate_satisfied = false;
        let err = transition(&mut s, PrpPhase::Conclude, TransitionMode::Strict, false).unwrap_err();
        assert!(matches!(err, PrpError::InvalidTransition { .. }));
    }

    #[test]
    fn propose_to_hypothesize_requires_skeptic_rejection() {
        let mut s = state();
        s.prp_phase = PrpPhase::Propose;
        let err = transition(&mut s, PrpPhase::Hypothesize, TransitionMode::Strict, false).unwrap_err();
        assert!(matches!(err, PrpError::InvalidTransition { .. }));

        transition(&mut s, PrpPhase::Hypothesize, TransitionMode::Strict, true).unwrap();
        assert_eq!(s.prp_phase, PrpPhase::Hypothesize);
        assert_eq!(s.cycle_counter, 1);
        assert!(s.invariants.needs_test_after_rejection);
    }
}
