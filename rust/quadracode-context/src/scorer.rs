//! Heuristic quality scorer (spec §4.6 "Quality scoring"): a weighted sum
//! across six dimensions, used when `Config::scorer_mode = heuristic`. An
//! LLM-rubric implementation of [`Scorer`] can be substituted without
//! touching the pipeline, per spec: "the scoring function is pluggable."

use std::collections::HashSet;

use chrono::Utc;
use quadracode_types::ContextSegment;

use crate::ports::{QualityScore, Scorer};

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl Scorer for HeuristicScorer {
    fn score(&self, segments: &[ContextSegment]) -> QualityScore {
        if segments.is_empty() {
            return QualityScore {
                relevance: 0.0,
                coherence: 1.0,
                completeness: 0.0,
                freshness: 1.0,
                diversity: 0.0,
                efficiency: 1.0,
            };
        }

        let now = Utc::now();
        let total_tokens: u64 = segments.iter().map(|s| s.token_count as u64).sum();

        // Relevance: average normalized priority.
        let relevance = segments.iter().map(|s| s.priority as f64 / 10.0).sum::<f64>() / segments.len() as f64;

        // Coherence: penalize a context dominated by a single giant segment.
        let max_share = segments
            .iter()
            .map(|s| if total_tokens == 0 { 0.0 } else { s.token_count as f64 / total_tokens as f64 })
            .fold(0.0_f64, f64::max);
        let coherence = 1.0 - max_share.min(1.0) * 0.5;

        // Completeness: presence of a conversation summary plus breadth of kinds.
        let distinct_kinds: HashSet<_> = segments.iter().map(|s| s.kind).collect();
        let completeness = (distinct_kinds.len() as f64 / 7.0).min(1.0);

        // Freshness: exponential decay on age of the most recently used segment.
        let newest_age_s = segments
            .iter()
            .map(|s| now.signed_duration_since(s.last_used_at).num_seconds().max(0) as f64)
            .fold(f64::MAX, f64::min);
        let freshness = (-newest_age_s / 3600.0).exp().clamp(0.0, 1.0);

        // Diversity: unique-content ratio.
        let unique_contents: HashSet<&str> = segments.iter().map(|s| s.content.as_str()).collect();
        let diversity = unique_contents.len() as f64 / segments.len() as f64;

        // Efficiency: tokens per segment, inverted and normalized against a
        // generous per-segment ceiling.
        let avg_tokens = total_tokens as f64 / segments.len() as f64;
        let efficiency = (1.0 - (avg_tokens / 4000.0)).clamp(0.0, 1.0);

        QualityScore { relevance, coherence, completeness, freshness, diversity, efficiency }
    }
}
