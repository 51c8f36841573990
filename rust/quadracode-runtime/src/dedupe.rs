//! Crash-safe dedupe for the "checkpoint-then-ack" gap (spec §4.10 step 6:
//! "Crash between put and ack is acceptable: next run will replay the
//! envelope, detect the session's already-acked stream_id in its dedupe
//! set, and skip"; spec §8 S6). The dedupe set itself lives in
//! [`quadracode_types::SessionState::processed_envelopes`] so it is loaded
//! from and committed to the checkpoint store alongside the rest of the
//! session's state — these are thin helpers over that field rather than a
//! process-local cache, so a restart sees exactly what the last successful
//! `put` committed.

use quadracode_fabric::StreamId;
use quadracode_types::SessionState;

pub fn already_processed(state: &SessionState, recipient: &str, id: StreamId) -> bool {
    state.processed_envelopes.contains(recipient, id.0)
}

pub fn mark_processed(state: &mut SessionState, recipient: &str, id: StreamId) {
    state.processed_envelopes.mark(recipient, id.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::SessionId;

    #[test]
    fn marks_and_reports_processed_ids() {
        let mut state = SessionState::new(SessionId::new("s-1"));
        assert!(!already_processed(&state, "orchestrator", StreamId(1)));
        mark_processed(&mut state, "orchestrator", StreamId(1));
        assert!(already_processed(&state, "orchestrator", StreamId(1)));
        assert!(!already_processed(&state, "worker", StreamId(1)));
    }

    #[test]
    fn survives_a_round_trip_through_a_fresh_state_loaded_from_the_same_fields() {
        // Simulates "restart": the dedupe set is whatever was serialized
        // into the checkpoint, not anything held in process memory.
        let mut state = SessionState::new(SessionId::new("s-1"));
        mark_processed(&mut state, "orchestrator", StreamId(7));
        let json = serde_json::to_string(&state).unwrap();
        let restarted: SessionState = serde_json::from_str(&json).unwrap();
        assert!(already_processed(&restarted, "orchestrator", StreamId(7)));
    }
}
