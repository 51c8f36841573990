//! Progressive loader (spec §4.6): loads at most `batch_size` new segments
//! per turn from known sources (skills catalog, project docs, code
//! search). Grounded on `knhk-autonomic::monitor::MonitoringComponent`'s
//! bounded-history-per-source collection shape.

use quadracode_types::{ContextSegment, SegmentId, SegmentKind, SessionState};
use tracing::instrument;

use crate::error::Result;

/// A known source of loadable context, each with a fixed default priority
/// (spec: "loaded segments are assigned priority by source").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    SkillsCatalog,
    ProjectDocs,
    CodeSearch,
}

impl SourceKind {
    fn segment_kind(self) -> SegmentKind {
        match self {
            SourceKind::SkillsCatalog => SegmentKind::Skills,
            SourceKind::ProjectDocs => SegmentKind::Docs,
            SourceKind::CodeSearch => SegmentKind::CodeSearch,
        }
    }

    fn default_priority(self) -> u8 {
        match self {
            SourceKind::SkillsCatalog => 6,
            SourceKind::ProjectDocs => 4,
            SourceKind::CodeSearch => 5,
        }
    }
}

/// A candidate segment a source is offering for loading this turn.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub content: String,
    pub token_count: u32,
}

/// A pluggable segment source. Implementations query the skills catalog,
/// project docs, or a code search index; the loader itself knows nothing
/// about how candidates are produced.
pub trait SegmentSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    /// Candidates not already present as segments in the session, newest
    /// or most relevant first.
    fn candidates(&self, state: &SessionState) -> Vec<Candidate>;
}

/// Load at most `batch_size` new segments total across all `sources`,
/// round-robin so no single source starves the others.
#[instrument(skip(state, sources))]
pub fn load_batch(state: &mut SessionState, sources: &[&dyn SegmentSource], batch_size: usize) -> Result<Vec<SegmentId>> {
    let mut loaded = Vec::new();
    if batch_size == 0 {
        return Ok(loaded);
    }

    let mut queues: Vec<(SourceKind, Vec<Candidate>)> =
        sources.iter().map(|s| (s.kind(), s.candidates(state))).collect();

    'outer: loop {
        let mut progressed = false;
        for (kind, queue) in queues.iter_mut() {
            if loaded.len() >= batch_size {
                break 'outer;
            }
            if let Some(candidate) = queue.pop() {
                let id = SegmentId::new(candidate.id);
                if state.segments.contains(&id) {
                    continue;
                }
                let segment = ContextSegment::new(id.clone(), kind.segment_kind(), candidate.content, candidate.token_count, kind.default_priority());
                state.segments.upsert(segment)?;
                loaded.push(id);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    Ok(loaded)
}
