//! `diff(session_id, cycle_a, cycle_b)` (spec §4.9): token/tool-call/stage
//! deltas plus PRP/exhaustion status changes between two cycles' events.

use serde::{Deserialize, Serialize};

use crate::event::{EventKind, TimeTravelEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleDiff {
    pub token_delta: i64,
    pub tool_calls_delta: i64,
    pub stage_delta: i64,
    pub status_changes: Vec<String>,
}

fn payload_tokens(payload: &serde_json::Value) -> i64 {
    payload.get("tokens").and_then(|v| v.as_i64()).unwrap_or(0)
}

impl CycleDiff {
    pub(crate) fn compute(a: &[TimeTravelEvent], b: &[TimeTravelEvent]) -> Self {
        let tokens_a: i64 = a.iter().map(|e| payload_tokens(&e.payload)).sum();
        let tokens_b: i64 = b.iter().map(|e| payload_tokens(&e.payload)).sum();
        let tool_a = a.iter().filter(|e| e.kind == EventKind::Tool).count() as i64;
        let tool_b = b.iter().filter(|e| e.kind == EventKind::Tool).count() as i64;
        let stage_a = a.iter().filter(|e| e.kind == EventKind::Stage).count() as i64;
        let stage_b = b.iter().filter(|e| e.kind == EventKind::Stage).count() as i64;

        let mut status_changes = Vec::new();
        if let (Some(last_a), Some(last_b)) = (a.last(), b.last()) {
            if last_a.prp_state != last_b.prp_state {
                status_changes.push(format!("prp_state: {:?} -> {:?}", last_a.prp_state, last_b.prp_state));
            }
            if last_a.exhaustion_mode != last_b.exhaustion_mode {
                status_changes.push(format!("exhaustion_mode: {:?} -> {:?}", last_a.exhaustion_mode, last_b.exhaustion_mode));
            }
        }

        CycleDiff {
            token_delta: tokens_b - tokens_a,
            tool_calls_delta: tool_b - tool_a,
            stage_delta: stage_b - stage_a,
            status_changes,
        }
    }
}
