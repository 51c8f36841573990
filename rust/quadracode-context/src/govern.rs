//! `govern_context` stage (spec §4.6): plans the final ordering of segments
//! for injection and produces a compact `prompt_outline`. Grounded on
//! `knhk-autonomic::planner::PlanningComponent::create_plan`'s
//! candidate-ranking-then-truncation shape.

use quadracode_types::{SegmentId, SegmentStore};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::ports::Governor;

/// Compact injection plan (spec §4.6: "system banner, focus segment id,
/// ordered segment ids").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOutline {
    pub system_banner: String,
    pub focus_segment_id: Option<SegmentId>,
    pub ordered_segment_ids: Vec<SegmentId>,
}

/// Heuristic governor: descending priority, then most-recently-used first.
/// Always includes every segment at or above `critical_priority`
/// regardless of the `max_segments` cap (spec §4.6 guarantee).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicGovernor;

impl Governor for HeuristicGovernor {
    fn plan(
        &self,
        segments: &[quadracode_types::ContextSegment],
        max_segments: usize,
        critical_priority: u8,
    ) -> Vec<SegmentId> {
        let mut ranked: Vec<&quadracode_types::ContextSegment> = segments.iter().collect();
        ranked.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.last_used_at.cmp(&a.last_used_at)));

        let critical: Vec<SegmentId> = ranked.iter().filter(|s| s.priority >= critical_priority).map(|s| s.id.clone()).collect();

        let mut ordered: Vec<SegmentId> = Vec::new();
        for seg in &ranked {
            if ordered.len() >= max_segments && !critical.contains(&seg.id) {
                continue;
            }
            if !ordered.contains(&seg.id) {
                ordered.push(seg.id.clone());
            }
            if ordered.len() >= max_segments.max(critical.len()) {
                break;
            }
        }
        ordered
    }
}

/// Run `govern_context`: ask the governor for an ordering, verify its
/// guarantees, and produce a [`PromptOutline`].
///
/// # Panics guarantees (enforced, not assumed)
/// Returns only segment ids that exist in `store` (spec §4.6: "ordered_segments
/// ⊆ current_segments") even if a buggy governor implementation returns a
/// stale id; callers can therefore trust the outline without re-validating.
#[instrument(skip(store, governor))]
pub fn govern_context(
    store: &SegmentStore,
    governor: &dyn Governor,
    max_governed_segments: usize,
    critical_priority: u8,
    system_banner: impl Into<String>,
) -> PromptOutline {
    let segments: Vec<quadracode_types::ContextSegment> = store.iter().cloned().collect();
    let mut ordered = governor.plan(&segments, max_governed_segments, critical_priority);
    ordered.retain(|id| store.contains(id));

    let focus_segment_id = ordered.first().cloned();

    PromptOutline { system_banner: system_banner.into(), focus_segment_id, ordered_segment_ids: ordered }
}
