//! The curator (spec §4.6): for each segment over budget, decide retain /
//! compress / summarize / externalize / discard. Grounded on
//! `knhk-autonomic::planner::PlanningComponent`'s policy-evaluation shape
//! (evaluate candidates in priority order, stop once the goal is met),
//! generalized from action selection to context-budget enforcement.

use quadracode_types::{ContextSegment, SegmentId, SegmentKind, SegmentStore};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::ports::LlmDriver;

/// The action the curator took on one segment, for telemetry and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum CurationAction {
    Retain,
    Compress { new_token_count: u32 },
    Summarize { merged_into: SegmentId, removed: Vec<SegmentId> },
    Externalize { restorable_reference: String },
    Discard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurationStep {
    pub segment_id: SegmentId,
    pub action: CurationAction,
}

/// Stub content length (in characters) left behind by `externalize`, chosen
/// small enough that its approximate token count is negligible against any
/// realistic segment budget.
const EXTERNALIZED_STUB_CHARS: usize = 24;

fn approx_tokens(content: &str) -> u32 {
    ((content.len() as u64 + 3) / 4) as u32
}

/// Curate `store` down to `budget` total tokens (segments only; the caller
/// adds conversation tokens separately, per spec §4.6's `messages_tokens +
/// segments_tokens` split). Segments with `compression_eligible = false`
/// are always retained (rule 1); the rest are processed in ascending
/// priority then ascending `last_used_at` (rule 2); processing stops as
/// soon as the projected total is within budget (rule 3).
///
/// The segment with the single lowest priority among eligible candidates is
/// externalized (when `externalize_enabled`) or discarded outright; the
/// remaining eligible segments are compressed via the LLM summarizer.
#[instrument(skip(store, llm))]
pub async fn curate(
    store: &mut SegmentStore,
    budget: u64,
    externalize_enabled: bool,
    llm: &dyn LlmDriver,
) -> Result<Vec<CurationStep>> {
    let mut steps = Vec::new();

    if store.total_tokens() <= budget {
        return Ok(steps);
    }

    let candidate_ids: Vec<SegmentId> =
        store.ascending_priority_then_lru().into_iter().filter(|s| s.compression_eligible).map(|s| s.id.clone()).collect();

    let lowest_priority_id = candidate_ids.first().cloned();

    for id in candidate_ids {
        if store.total_tokens() <= budget {
            break;
        }
        let Some(segment) = store.get(&id).cloned() else { continue };

        let action = if Some(&id) == lowest_priority_id.as_ref() {
            if externalize_enabled {
                externalize(store, &segment)?
            } else {
                store.remove(&id);
                CurationAction::Discard
            }
        } else {
            compress(store, &segment, llm).await?
        };

        debug!(segment_id = %id, ?action, "curator action");
        steps.push(CurationStep { segment_id: id, action });
    }

    Ok(steps)
}

fn externalize(store: &mut SegmentStore, segment: &ContextSegment) -> Result<CurationAction> {
    let reference = if segment.restorable_reference.is_empty() {
        format!("externalized/{}", segment.id)
    } else {
        segment.restorable_reference.clone()
    };
    let mut updated = segment.clone();
    updated.restorable_reference = reference.clone();
    let stub = format!("[externalized:{reference}]");
    updated.content = stub.chars().take(EXTERNALIZED_STUB_CHARS).collect();
    updated.token_count = approx_tokens(&updated.content);
    store.upsert(updated)?;
    Ok(CurationAction::Externalize { restorable_reference: reference })
}

async fn compress(store: &mut SegmentStore, segment: &ContextSegment, llm: &dyn LlmDriver) -> Result<CurationAction> {
    let summary = llm.compress_segment(&segment.content).await?;
    let mut updated = segment.clone();
    updated.content = summary;
    updated.token_count = approx_tokens(&updated.content);
    if updated.restorable_reference.is_empty() {
        updated.restorable_reference = format!("compressed/{}", segment.id);
    }
    store.upsert(updated.clone())?;
    Ok(CurationAction::Compress { new_token_count: updated.token_count })
}

/// Roll several low-priority segments of the same kind into a single
/// `summarize`d segment (spec §4.6 "summarize" decision). Used by callers
/// that want to pre-collapse many small tool-output segments before the
/// main budget loop runs.
pub async fn summarize_group(
    store: &mut SegmentStore,
    ids: &[SegmentId],
    merged_id: SegmentId,
    kind: SegmentKind,
    priority: u8,
    llm: &dyn LlmDriver,
) -> Result<CurationStep> {
    let contents: Vec<String> = ids.iter().filter_map(|id| store.get(id)).map(|s| s.content.clone()).collect();
    let joined = contents.join("\n---\n");
    let summary = llm.summarize_segments(&joined).await?;

    let merged = ContextSegment::new(merged_id.clone(), kind, summary, 0, priority);
    let mut merged = merged;
    merged.token_count = approx_tokens(&merged.content);

    for id in ids {
        store.remove(id);
    }
    store.upsert(merged)?;

    Ok(CurationStep {
        segment_id: merged_id.clone(),
        action: CurationAction::Summarize { merged_into: merged_id, removed: ids.to_vec() },
    })
}
