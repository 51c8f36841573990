//! Refinement ledger operations (spec §4.4): `propose_hypothesis`,
//! `conclude_hypothesis`, `query_past_failures`, `infer_causal_chain`.
//! Grounded on `knhk-autonomic::knowledge::KnowledgeBase`'s
//! append-only-history-plus-derived-statistics shape, generalized from
//! infrastructure incident records to refinement cycles.

use std::collections::BTreeSet;

use chrono::Utc;
use quadracode_types::{ExhaustionMode, RefinementLedgerEntry, RefinementStatus, SessionState};
use serde::{Deserialize, Serialize};

use crate::error::{PrpError, Result};

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn outcome_weight(status: RefinementStatus) -> Option<f64> {
    match status {
        RefinementStatus::Succeeded => Some(1.0),
        RefinementStatus::Failed | RefinementStatus::Rejected => Some(0.0),
        RefinementStatus::Proposed => None,
    }
}

/// Historical success rate over concluded entries, and the similarity-
/// weighted outcome average against `tokens`, combined with a novelty
/// multiplier into `predicted_success_probability` (spec §4.4: "combines
/// historical success rate, similar-entry outcomes, and a novelty
/// multiplier `0.4 + 0.6*novelty`").
fn predicted_success_probability(ledger: &[RefinementLedgerEntry], tokens: &BTreeSet<String>, novelty: f64) -> f64 {
    let concluded: Vec<&RefinementLedgerEntry> =
        ledger.iter().filter(|e| outcome_weight(e.status).is_some()).collect();

    let historical_rate = if concluded.is_empty() {
        0.5
    } else {
        let successes = concluded.iter().filter(|e| e.status == RefinementStatus::Succeeded).count();
        successes as f64 / concluded.len() as f64
    };

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for entry in &concluded {
        let sim = jaccard(tokens, &tokenize(&entry.hypothesis));
        if sim > 0.0 {
            if let Some(w) = outcome_weight(entry.status) {
                weighted_sum += sim * w;
                weight_total += sim;
            }
        }
    }
    let similar_entry_rate = if weight_total > 0.0 { weighted_sum / weight_total } else { historical_rate };

    let combined = (historical_rate + similar_entry_rate) / 2.0;
    let multiplier = 0.4 + 0.6 * novelty;
    (combined * multiplier).clamp(0.0, 1.0)
}

/// `propose_hypothesis(hypothesis, strategy?, dependencies?) -> cycle_id`.
///
/// `differentiation_note` is the caller's escape hatch past `novelty_blocked`
/// when a highly-similar prior failure shares the same strategy.
pub fn propose_hypothesis(
    state: &mut SessionState,
    hypothesis: impl Into<String>,
    strategy: Option<String>,
    dependencies: Vec<u64>,
    differentiation_note: Option<&str>,
) -> Result<u64> {
    let hypothesis = hypothesis.into();
    let tokens = tokenize(&hypothesis);

    let max_similarity = state
        .ledger
        .iter()
        .map(|e| jaccard(&tokens, &tokenize(&e.hypothesis)))
        .fold(0.0_f64, f64::max);
    let novelty_score = 1.0 - max_similarity;

    if differentiation_note.is_none() {
        let blocked = state.ledger.iter().any(|e| {
            e.status == RefinementStatus::Failed
                && strategy.is_some()
                && e.strategy == strategy
                && jaccard(&tokens, &tokenize(&e.hypothesis)) >= 0.7
        });
        if blocked {
            return Err(PrpError::NoveltyBlocked);
        }
    }

    let cycle_id = state.ledger.len() as u64 + 1;
    let predicted = predicted_success_probability(&state.ledger, &tokens, novelty_score);

    state.ledger.push(RefinementLedgerEntry {
        cycle_id,
        timestamp: Utc::now(),
        hypothesis,
        status: RefinementStatus::Proposed,
        outcome_summary: None,
        exhaustion_trigger: None,
        test_results: None,
        strategy,
        novelty_score,
        dependencies,
        predicted_success_probability: predicted,
        causal_links: Vec::new(),
    });

    Ok(cycle_id)
}

/// `conclude_hypothesis(cycle_id, status, outcome_summary, test_results?)`.
/// Mutates the matching entry exactly once — a second call on an already
/// concluded cycle is an error rather than a silent overwrite.
pub fn conclude_hypothesis(
    state: &mut SessionState,
    cycle_id: u64,
    status: RefinementStatus,
    outcome_summary: impl Into<String>,
    test_results: Option<serde_json::Value>,
) -> Result<()> {
    let entry = state
        .ledger
        .iter_mut()
        .find(|e| e.cycle_id == cycle_id)
        .ok_or(PrpError::UnknownCycle(cycle_id))?;

    if entry.status != RefinementStatus::Proposed {
        return Err(PrpError::AlreadyConcluded(cycle_id));
    }

    entry.status = status;
    entry.outcome_summary = Some(outcome_summary.into());
    if status != RefinementStatus::Succeeded {
        entry.exhaustion_trigger = entry.exhaustion_trigger.or(Some(ExhaustionMode::None));
    }
    entry.test_results = test_results;
    Ok(())
}

pub fn query_past_failures<'a>(
    state: &'a SessionState,
    pattern: Option<&str>,
) -> Vec<&'a RefinementLedgerEntry> {
    state
        .ledger
        .iter()
        .filter(|e| e.status == RefinementStatus::Failed)
        .filter(|e| match pattern {
            Some(p) => e.hypothesis.to_lowercase().contains(&p.to_lowercase()),
            None => true,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CausalEdge {
    pub from: u64,
    pub to: u64,
    pub confidence: f64,
}

/// `infer_causal_chain(cycle_ids) -> [{from, to, confidence}]`: predecessor
/// edges from the ledger's dependency graph. Base confidence 0.55, bumped
/// to 0.72 when the predecessor succeeded and 0.85 when it failed.
pub fn infer_causal_chain(state: &SessionState, cycle_ids: &[u64]) -> Vec<CausalEdge> {
    let mut edges = Vec::new();
    for &to in cycle_ids {
        let Some(entry) = state.ledger.iter().find(|e| e.cycle_id == to) else {
            continue;
        };
        for &from in &entry.dependencies {
            let confidence = match state.ledger.iter().find(|e| e.cycle_id == from).map(|p| p.status) {
                Some(RefinementStatus::Succeeded) => 0.72,
                Some(RefinementStatus::Failed) => 0.85,
                _ => 0.55,
            };
            edges.push(CausalEdge { from, to, confidence });
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::SessionId;

    fn state() -> SessionState {
        SessionState::new(SessionId::new("s-1"))
    }

    #[test]
    fn propose_then_conclude_round_trips() {
        let mut s = state();
        let id = propose_hypothesis(&mut s, "try caching layer", Some("perf".into()), vec![], None).unwrap();
        assert_eq!(id, 1);
        conclude_hypothesis(&mut s, id, RefinementStatus::Succeeded, "cache worked", None).unwrap();
        assert_eq!(s.ledger[0].status, RefinementStatus::Succeeded);
    }

    #[test]
    fn concluding_twice_errors() {
        let mut s = state();
        let id = propose_hypothesis(&mut s, "try caching layer", None, vec![], None).unwrap();
        conclude_hypothesis(&mut s, id, RefinementStatus::Succeeded, "ok", None).unwrap();
        let err = conclude_hypothesis(&mut s, id, RefinementStatus::Failed, "oops", None).unwrap_err();
        assert!(matches!(err, PrpError::AlreadyConcluded(_)));
    }

    #[test]
    fn similar_failed_strategy_is_novelty_blocked() {
        let mut s = state();
        let id = propose_hypothesis(&mut s, "add redis cache for session lookups", Some("perf".into()), vec![], None).unwrap();
        conclude_hypothesis(&mut s, id, RefinementStatus::Failed, "regression", None).unwrap();

        let err = propose_hypothesis(&mut s, "add redis cache for session lookups", Some("perf".into()), vec![], None)
            .unwrap_err();
        assert!(matches!(err, PrpError::NoveltyBlocked));

        // A differentiation note lets the caller proceed anyway.
        propose_hypothesis(
            &mut s,
            "add redis cache for session lookups",
            Some("perf".into()),
            vec![],
            Some("using TTL eviction this time"),
        )
        .unwrap();
    }

    #[test]
    fn query_past_failures_filters_by_pattern() {
        let mut s = state();
        let a = propose_hypothesis(&mut s, "retry with backoff", None, vec![], None).unwrap();
        conclude_hypothesis(&mut s, a, RefinementStatus::Failed, "still flaky", None).unwrap();
        let b = propose_hypothesis(&mut s, "switch to websockets", None, vec![], None).unwrap();
        conclude_hypothesis(&mut s, b, RefinementStatus::Succeeded, "stable", None).unwrap();

        assert_eq!(query_past_failures(&s, None).len(), 1);
        assert_eq!(query_past_failures(&s, Some("backoff")).len(), 1);
        assert_eq!(query_past_failures(&s, Some("websockets")).len(), 0);
    }

    #[test]
    fn infer_causal_chain_bumps_confidence_by_predecessor_outcome() {
        let mut s = state();
        let a = propose_hypothesis(&mut s, "hypothesis a", None, vec![], None).unwrap();
        conclude_hypothesis(&mut s, a, RefinementStatus::Failed, "nope", None).unwrap();
        let b = propose_hypothesis(&mut s, "hypothesis b", None, vec![a], None).unwrap();

        let edges = infer_causal_chain(&s, &[b]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0], CausalEdge { from: a, to: b, confidence: 0.85 });
    }
}
