//! C2 — Checkpoint Store (spec §4.2): durable per-session snapshots of
//! [`SessionState`], loaded once at session start and replaced wholesale
//! after every cycle.

use async_trait::async_trait;
use dashmap::DashMap;
use quadracode_types::{SessionId, SessionState};
use tracing::instrument;

use crate::error::Result;

/// Whole-state checkpoint contract. `put` replaces the prior checkpoint for
/// the session entirely; there is no partial update (spec §4.2: the state is
/// always read-modify-written as one unit to avoid torn writes across the
/// segment store, ledger, and counters).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionState>>;

    async fn put(&self, state: &SessionState) -> Result<()>;

    async fn list_sessions(&self) -> Result<Vec<SessionId>>;

    async fn delete(&self, session_id: &SessionId) -> Result<()>;
}

/// In-memory checkpoint store backed by a [`DashMap`], for tests and
/// single-process deployments that accept losing state across restarts.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    sessions: DashMap<SessionId, SessionState>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionState>> {
        Ok(self.sessions.get(session_id).map(|entry| entry.clone()))
    }

    async fn put(&self, state: &SessionState) -> Result<()> {
        self.sessions.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>> {
        Ok(self.sessions.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

/// `sled`-backed durable checkpoint store: one tree, keyed by session id,
/// JSON-encoded, flushed before `put` returns so a crash immediately after
/// a commit cannot observe a stale checkpoint on restart. Grounded on
/// `knhk-lockchain::storage::LockchainStorage::persist_root`'s
/// insert-then-`flush_async` pattern.
pub struct SledCheckpointStore {
    tree: sled::Tree,
}

impl SledCheckpointStore {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree("checkpoints")?;
        Ok(Self { tree })
    }
}

#[async_trait]
impl CheckpointStore for SledCheckpointStore {
    #[instrument(skip(self))]
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionState>> {
        match self.tree.get(session_id.0.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, state))]
    async fn put(&self, state: &SessionState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.tree.insert(state.session_id.0.as_bytes(), bytes)?;
        self.tree.flush_async().await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let mut out = Vec::new();
        for key in self.tree.iter().keys() {
            let key = key?;
            if let Ok(id) = String::from_utf8(key.to_vec()) {
                out.push(SessionId(id));
            }
        }
        Ok(out)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<()> {
        self.tree.remove(session_id.0.as_bytes())?;
        self.tree.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use quadracode_types::{
        ContextSegment, CritiqueEntry, ExhaustionMode, Message, MessageRole, PrpPhase, RefinementLedgerEntry, RefinementStatus, SegmentId, SegmentKind, Severity, SnapshotRecord,
        TokenUsage,
    };

    use super::*;

    /// A [`SessionState`] with every field populated past its default, so a
    /// round trip exercising only `session_id` equality can't hide a dropped
    /// or mis-encoded field elsewhere in the struct.
    fn richly_populated_state(id: &str) -> SessionState {
        let mut state = SessionState::new(SessionId::new(id));
        state.conversation.push(Message::new(MessageRole::User, "investigate the flaky test"));
        state.conversation.push(Message::new(MessageRole::Assistant, "looking into it"));
        state
            .segments
            .upsert(ContextSegment::new(SegmentId::new("seg-1"), SegmentKind::ToolOutput, "pytest output", 128, 5))
            .unwrap();
        state.prp_phase = PrpPhase::Execute;
        state.cycle_counter = 3;
        state.in_prp = true;
        state.ledger.push(RefinementLedgerEntry {
            cycle_id: 1,
            timestamp: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc),
            hypothesis: "retry is racing the fixture teardown".into(),
            status: RefinementStatus::Failed,
            outcome_summary: Some("fixture closes before retry completes".into()),
            exhaustion_trigger: None,
            test_results: Some(serde_json::json!({"passed": 3, "failed": 1})),
            strategy: Some("add teardown barrier".into()),
            novelty_score: 0.82,
            dependencies: vec![],
            predicted_success_probability: 0.892,
            causal_links: vec![],
        });
        state.critique_backlog.push(CritiqueEntry {
            category: "coverage".into(),
            severity: Severity::Medium,
            rationale: "no assertion on teardown order".into(),
            derived_tests: vec!["test_teardown_happens_before_retry".into()],
        });
        state.exhaustion.set_mode(ExhaustionMode::PredictedExhaustion, 0.71, "predictor flagged plateau");
        state.invariants.context_updated_in_cycle = true;
        state.invariants.violation_log.push("skepticism gate unresolved at cycle 2".into());
        state.autonomy.false_stop_events = 2;
        state.autonomy.skepticism_challenges = 1;
        state.workspace.workspace = "main".into();
        state.workspace.push_snapshot(SnapshotRecord {
            id: "snap-0".into(),
            timestamp: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc),
            archive_ref: "snapshots/snap-0.tar.zst".into(),
            manifest: vec![],
            aggregate_checksum: "deadbeef".into(),
            reason: "pre-execute snapshot".into(),
        });
        state.token_usage.push(TokenUsage { cycle_id: 1, messages_tokens: 40, segments_tokens: 128, total_sent_to_llm: 168 });
        state.required_artifacts.push("reproduction_log".into());
        state.processed_envelopes.mark("orchestrator", 42);
        state
    }

    /// Spec §8: "Any state serialized via C2 then deserialized equals the
    /// original (field-wise equivalence, enums canonicalized)." Compared as
    /// JSON values rather than via `PartialEq` since several nested types
    /// only derive `Serialize`/`Deserialize`; the JSON comparison still
    /// catches any field silently dropped or re-encoded during the round
    /// trip.
    #[tokio::test]
    async fn in_memory_store_round_trip_is_field_wise_equivalent() {
        let store = InMemoryCheckpointStore::new();
        let state = richly_populated_state("s-rich-mem");
        store.put(&state).await.unwrap();

        let loaded = store.get(&state.session_id).await.unwrap().unwrap();
        assert_eq!(serde_json::to_value(&loaded).unwrap(), serde_json::to_value(&state).unwrap());
    }

    #[tokio::test]
    async fn sled_store_round_trip_is_field_wise_equivalent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledCheckpointStore::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let state = richly_populated_state("s-rich-sled");
        store.put(&state).await.unwrap();

        let loaded = store.get(&state.session_id).await.unwrap().unwrap();
        assert_eq!(serde_json::to_value(&loaded).unwrap(), serde_json::to_value(&state).unwrap());
    }

    #[tokio::test]
    async fn in_memory_round_trips_state() {
        let store = InMemoryCheckpointStore::new();
        let state = SessionState::new(SessionId::new("s-1"));
        store.put(&state).await.unwrap();

        let loaded = store.get(&state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.session_id, state.session_id);
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);

        store.delete(&state.session_id).await.unwrap();
        assert!(store.get(&state.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_session_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.get(&SessionId::new("absent")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sled_store_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledCheckpointStore::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let state = SessionState::new(SessionId::new("s-sled"));
        store.put(&state).await.unwrap();

        let loaded = store.get(&state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.session_id, state.session_id);

        store.delete(&state.session_id).await.unwrap();
        assert!(store.get(&state.session_id).await.unwrap().is_none());
    }
}
