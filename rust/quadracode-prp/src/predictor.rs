//! C5 — Exhaustion Predictor (spec §4.5): a rolling-feature classifier over
//! ledger outcomes, grounded on
//! `knhk-workflow-engine::neural::models::failure_predictor::FailurePredictor`'s
//! shape (a feature vector plus a `predict` entry point) with the ONNX/
//! tract machinery dropped for a closed-form logistic model, per spec §9:
//! "the implementation may use any small numeric routine."

use quadracode_types::{RefinementStatus, SessionState};
use serde::{Deserialize, Serialize};

/// Most recent ledger entries considered by the predictor (spec §4.5).
pub const LEDGER_WINDOW: usize = 128;

/// Feature vector computed on demand from the refinement ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExhaustionFeatures {
    pub total_cycles: f64,
    pub rolling_exhaustion_rate: f64,
    pub rolling_failure_rate: f64,
    pub mean_hypothesis_length: f64,
    pub outcome_length_mean: f64,
    pub outcome_length_stddev: f64,
    pub consecutive_exhaustion: f64,
    pub consecutive_failure: f64,
    pub cycles_since_last_exhaustion: f64,
    pub overall_success_rate: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn is_exhausting(status: RefinementStatus) -> bool {
    matches!(status, RefinementStatus::Rejected)
}

/// Compute the feature vector over the most recent [`LEDGER_WINDOW`]
/// entries of `state`'s refinement ledger.
pub fn compute_features(state: &SessionState) -> ExhaustionFeatures {
    let entries = &state.ledger;
    let window_start = entries.len().saturating_sub(LEDGER_WINDOW);
    let window = &entries[window_start..];

    if window.is_empty() {
        return ExhaustionFeatures {
            total_cycles: 0.0,
            rolling_exhaustion_rate: 0.0,
            rolling_failure_rate: 0.0,
            mean_hypothesis_length: 0.0,
            outcome_length_mean: 0.0,
            outcome_length_stddev: 0.0,
            consecutive_exhaustion: 0.0,
            consecutive_failure: 0.0,
            cycles_since_last_exhaustion: 0.0,
            overall_success_rate: 0.0,
        };
    }

    let total_cycles = window.len() as f64;
    let exhaustion_count = window.iter().filter(|e| is_exhausting(e.status)).count() as f64;
    let failure_count = window.iter().filter(|e| e.status == RefinementStatus::Failed).count() as f64;
    let success_count = window.iter().filter(|e| e.status == RefinementStatus::Succeeded).count() as f64;

    let hyp_lengths: Vec<f64> = window.iter().map(|e| e.hypothesis.len() as f64).collect();
    let outcome_lengths: Vec<f64> = window
        .iter()
        .filter_map(|e| e.outcome_summary.as_ref().map(|s| s.len() as f64))
        .collect();
    let outcome_mean = mean(&outcome_lengths);

    let mut consecutive_exhaustion = 0.0;
    for e in window.iter().rev() {
        if is_exhausting(e.status) {
            consecutive_exhaustion += 1.0;
        } else {
            break;
        }
    }

    let mut consecutive_failure = 0.0;
    for e in window.iter().rev() {
        if e.status == RefinementStatus::Failed {
            consecutive_failure += 1.0;
        } else {
            break;
        }
    }

    let cycles_since_last_exhaustion = window
        .iter()
        .rev()
        .position(|e| is_exhausting(e.status))
        .map(|idx| idx as f64)
        .unwrap_or(total_cycles);

    ExhaustionFeatures {
        total_cycles,
        rolling_exhaustion_rate: exhaustion_count / total_cycles,
        rolling_failure_rate: failure_count / total_cycles,
        mean_hypothesis_length: mean(&hyp_lengths),
        outcome_length_mean: outcome_mean,
        outcome_length_stddev: stddev(&outcome_lengths, outcome_mean),
        consecutive_exhaustion,
        consecutive_failure,
        cycles_since_last_exhaustion,
        overall_success_rate: success_count / total_cycles,
    }
}

/// Fixed weights for a small balanced logistic classifier over
/// [`ExhaustionFeatures`]. Hand-tuned rather than learned: the spec leaves
/// the routine open (§9), and a closed-form model needs no training loop
/// or ONNX runtime in the core.
const WEIGHTS: [f64; 9] = [
    2.5,  // rolling_exhaustion_rate
    1.4,  // rolling_failure_rate
    0.4,  // consecutive_exhaustion (capped contribution via /5 below)
    0.2,  // consecutive_failure
    -0.6, // cycles_since_last_exhaustion (negative: recency increases risk)
    -2.0, // overall_success_rate
    0.0,  // mean_hypothesis_length (unused directly, kept for vector symmetry)
    0.0,  // outcome_length_mean
    0.0,  // outcome_length_stddev
];
const BIAS: f64 = -1.2;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// How many distinct `RefinementStatus` outcome classes appear in the
/// window — the predictor needs at least two to produce a non-trivial
/// estimate (spec §4.5, §8: "predictor with fewer than two outcome classes
/// returns 0").
fn distinct_outcome_classes(state: &SessionState) -> usize {
    let window_start = state.ledger.len().saturating_sub(LEDGER_WINDOW);
    state.ledger[window_start..]
        .iter()
        .map(|e| e.status)
        .collect::<std::collections::HashSet<_>>()
        .len()
}

/// `P(exhaustion within next cycle)`. Returns 0 when the ledger carries
/// fewer than two distinct outcome classes (spec §4.5).
pub fn predict_exhaustion_probability(state: &SessionState) -> f64 {
    if distinct_outcome_classes(state) < 2 {
        return 0.0;
    }

    let f = compute_features(state);
    let capped_consecutive_exhaustion = (f.consecutive_exhaustion / 5.0).min(1.0);
    let capped_consecutive_failure = (f.consecutive_failure / 5.0).min(1.0);
    let recency = 1.0 / (1.0 + f.cycles_since_last_exhaustion);

    let z = BIAS
        + WEIGHTS[0] * f.rolling_exhaustion_rate
        + WEIGHTS[1] * f.rolling_failure_rate
        + WEIGHTS[2] * capped_consecutive_exhaustion
        + WEIGHTS[3] * capped_consecutive_failure
        + WEIGHTS[4] * recency
        + WEIGHTS[5] * f.overall_success_rate;

    sigmoid(z).clamp(0.0, 1.0)
}

/// Threshold from spec §4.5: "when P >= 0.7, the context engine raises
/// `exhaustion_mode=predicted_exhaustion`".
pub const PREDICTED_EXHAUSTION_THRESHOLD: f64 = 0.7;

pub fn predicts_exhaustion(state: &SessionState) -> bool {
    predict_exhaustion_probability(state) >= PREDICTED_EXHAUSTION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::SessionId;

    fn state() -> SessionState {
        SessionState::new(SessionId::new("s-1"))
    }

    #[test]
    fn empty_ledger_returns_zero() {
        let s = state();
        assert_eq!(predict_exhaustion_probability(&s), 0.0);
    }

    #[test]
    fn single_outcome_class_returns_zero() {
        let mut s = state();
        for i in 0..5 {
            s.ledger.push(quadracode_types::RefinementLedgerEntry {
                cycle_id: i,
                timestamp: chrono::Utc::now(),
                hypothesis: "h".into(),
                status: RefinementStatus::Succeeded,
                outcome_summary: Some("ok".into()),
                exhaustion_trigger: None,
                test_results: None,
                strategy: None,
                novelty_score: 1.0,
                dependencies: vec![],
                predicted_success_probability: 1.0,
                causal_links: vec![],
            });
        }
        assert_eq!(predict_exhaustion_probability(&s), 0.0);
    }

    #[test]
    fn repeated_recent_failures_raise_probability_above_threshold() {
        let mut s = state();
        for i in 0..10 {
            let status = if i < 2 { RefinementStatus::Succeeded } else { RefinementStatus::Rejected };
            s.ledger.push(quadracode_types::RefinementLedgerEntry {
                cycle_id: i,
                timestamp: chrono::Utc::now(),
                hypothesis: "h".into(),
                status,
                outcome_summary: Some("x".into()),
                exhaustion_trigger: None,
                test_results: None,
                strategy: None,
                novelty_score: 0.5,
                dependencies: vec![],
                predicted_success_probability: 0.5,
                causal_links: vec![],
            });
        }
        assert!(predicts_exhaustion(&s));
    }
}
