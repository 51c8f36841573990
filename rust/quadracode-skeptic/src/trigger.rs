//! C7 — Skeptic Trigger (spec §4.7): parses a skeptic's structured
//! rejection into a deterministic trigger and folds it into session state.
//! New logic with no direct teacher analogue; built in the teacher's
//! `serde_json`-first parsing style used throughout
//! `knhk-sidecar::json_parser`.

use quadracode_types::{CritiqueEntry, ExhaustionMode, Severity, SessionState};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Result, SkepticError};

/// The parsed skeptic trigger contract (spec §4.7, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkepticTrigger {
    pub cycle_iteration: u64,
    pub exhaustion_mode: ExhaustionMode,
    #[serde(default)]
    pub required_artifacts: Vec<String>,
    pub rationale: Option<String>,
}

/// Pull a JSON object out of `message`: either the whole string, or the
/// body of a fenced code block (```` ```...``` ````), whichever parses.
fn extract_json(message: &str) -> &str {
    let trimmed = message.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }
    trimmed
}

/// Parse a skeptic's `message` into a [`SkepticTrigger`]. Anything that
/// doesn't decode to the exact contract fails (spec §4.7: "malformed
/// triggers fail; a bounded number of re-queues is allowed before
/// dead-lettering" — the re-queue/dead-letter bookkeeping is the runtime
/// loop's responsibility, not this parser's).
pub fn parse_trigger(message: &str) -> Result<SkepticTrigger> {
    let candidate = extract_json(message);
    serde_json::from_str(candidate).map_err(|e| SkepticError::MalformedTrigger(e.to_string()))
}

fn infer_category(rationale: &str) -> String {
    let lower = rationale.to_lowercase();
    if lower.contains("test") {
        "test_failure".to_string()
    } else if lower.contains("coverage") {
        "coverage_gap".to_string()
    } else if lower.contains("regression") {
        "regression".to_string()
    } else {
        "general_rejection".to_string()
    }
}

fn infer_severity(rationale: &str) -> Severity {
    let lower = rationale.to_lowercase();
    if lower.contains("crash") || lower.contains("security") || lower.contains("fail") {
        Severity::High
    } else if lower.contains("partial") || lower.contains("flaky") {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Synthesize the `hypothesis_critique` tool message the driver sees next
/// turn (spec §4.7): category inferred from `rationale`, severity from the
/// same heuristic.
pub fn synthesize_critique(trigger: &SkepticTrigger) -> CritiqueEntry {
    let rationale = trigger.rationale.clone().unwrap_or_else(|| "skeptic rejected without rationale".to_string());
    CritiqueEntry {
        category: infer_category(&rationale),
        severity: infer_severity(&rationale),
        rationale,
        derived_tests: trigger.required_artifacts.clone(),
    }
}

/// Apply a valid trigger to `state`: set `exhaustion_mode`, attach
/// `required_artifacts`, append the synthesized critique, and invoke the
/// PROPOSE -> HYPOTHESIZE transition with `skeptic_triggered=true` (spec
/// §4.7). Uses [`quadracode_prp::TransitionMode::Strict`] — a skeptic
/// trigger is only ever applied when the caller (C10) has already
/// confirmed the session is in `Propose`.
#[instrument(skip(state, trigger))]
pub fn apply_trigger(state: &mut SessionState, trigger: &SkepticTrigger) -> Result<()> {
    state.exhaustion.set_mode(trigger.exhaustion_mode, 1.0, "skeptic_trigger");
    state.required_artifacts = trigger.required_artifacts.clone();
    state.critique_backlog.push(synthesize_critique(trigger));

    quadracode_prp::transition(state, quadracode_types::PrpPhase::Hypothesize, quadracode_prp::TransitionMode::Strict, true)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::{PrpPhase, SessionId};

    fn state_in_propose() -> SessionState {
        let mut s = SessionState::new(SessionId::new("s-1"));
        s.prp_phase = PrpPhase::Propose;
        s
    }

    #[test]
    fn parses_raw_json_trigger() {
        let msg = r#"{"cycle_iteration":3,"exhaustion_mode":"test_failure","required_artifacts":["unit_tests","coverage_report"],"rationale":"tests 2/5 failing"}"#;
        let trigger = parse_trigger(msg).unwrap();
        assert_eq!(trigger.cycle_iteration, 3);
        assert_eq!(trigger.exhaustion_mode, ExhaustionMode::TestFailure);
        assert_eq!(trigger.required_artifacts, vec!["unit_tests", "coverage_report"]);
    }

    #[test]
    fn parses_fenced_json_trigger() {
        let msg = "Here is my rejection:\n```json\n{\"cycle_iteration\":1,\"exhaustion_mode\":\"hypothesis_exhausted\",\"required_artifacts\":[]}\n```\n";
        let trigger = parse_trigger(msg).unwrap();
        assert_eq!(trigger.cycle_iteration, 1);
        assert_eq!(trigger.exhaustion_mode, ExhaustionMode::HypothesisExhausted);
    }

    #[test]
    fn malformed_trigger_fails() {
        let err = parse_trigger("I don't think this is ready").unwrap_err();
        assert!(matches!(err, SkepticError::MalformedTrigger(_)));
    }

    #[test]
    fn same_rejection_phrased_two_ways_maps_to_the_same_trigger() {
        let a = parse_trigger(r#"{"cycle_iteration":3,"exhaustion_mode":"test_failure","required_artifacts":["unit_tests"],"rationale":"2/5 tests failing"}"#).unwrap();
        let b = parse_trigger("```json\n{\"cycle_iteration\":3,\"exhaustion_mode\":\"test_failure\",\"required_artifacts\":[\"unit_tests\"],\"rationale\":\"two of five tests are failing\"}\n```").unwrap();
        assert_eq!(a.cycle_iteration, b.cycle_iteration);
        assert_eq!(a.exhaustion_mode, b.exhaustion_mode);
        assert_eq!(a.required_artifacts, b.required_artifacts);
    }

    #[test]
    fn apply_trigger_transitions_propose_to_hypothesize_and_sets_state() {
        let mut state = state_in_propose();
        let trigger = SkepticTrigger {
            cycle_iteration: 3,
            exhaustion_mode: ExhaustionMode::TestFailure,
            required_artifacts: vec!["unit_tests".into(), "coverage_report".into()],
            rationale: Some("tests 2/5 failing".into()),
        };
        apply_trigger(&mut state, &trigger).unwrap();

        assert_eq!(state.prp_phase, PrpPhase::Hypothesize);
        assert_eq!(state.cycle_counter, 1);
        assert!(state.invariants.needs_test_after_rejection);
        assert_eq!(state.required_artifacts, vec!["unit_tests".to_string(), "coverage_report".to_string()]);
        assert_eq!(state.exhaustion.mode, ExhaustionMode::TestFailure);
        assert_eq!(state.critique_backlog.len(), 1);
    }
}
