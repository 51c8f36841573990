//! Durable per-session state (spec §3) and the agent registry record.
//!
//! `SessionState` is a fixed record of typed sub-records, not a dynamic
//! dict of mixed shapes (spec §9 redesign flag). `ContextSegment`s live in a
//! single `SegmentStore` which is the sole source of truth for engineered
//! context and enforces the two segment invariants (unique ids, at most one
//! `conversation-summary`) at every mutation rather than leaving callers to
//! maintain them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TypesError};

/// Stable per-conversation identifier that survives restart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a [`ContextSegment`] within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation role (spec §3: "ordered sequence of messages, each tagged
/// with role").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
}

/// A single turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            created_at: Utc::now(),
        }
    }
}

/// Kind of engineered context segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    ConversationSummary,
    CodeSearch,
    ToolOutput,
    Skills,
    Docs,
    Plan,
    Other,
}

/// A unit of engineered context (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSegment {
    pub id: SegmentId,
    pub kind: SegmentKind,
    pub content: String,
    pub token_count: u32,
    /// 1..=10, higher is more important.
    pub priority: u8,
    pub compression_eligible: bool,
    pub restorable_reference: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl ContextSegment {
    pub fn new(id: SegmentId, kind: SegmentKind, content: impl Into<String>, token_count: u32, priority: u8) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            content: content.into(),
            token_count,
            priority: priority.clamp(1, 10),
            compression_eligible: !matches!(kind, SegmentKind::ConversationSummary),
            restorable_reference: String::new(),
            created_at: now,
            last_used_at: now,
        }
    }
}

/// The single source of truth for a session's engineered context.
///
/// Enforces spec §3's segment invariants at every mutation: ids are unique,
/// and at most one segment has `kind = conversation-summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentStore {
    segments: BTreeMap<SegmentId, ContextSegment>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a segment, enforcing both segment invariants.
    pub fn upsert(&mut self, segment: ContextSegment) -> Result<()> {
        if segment.kind == SegmentKind::ConversationSummary {
            if let Some(existing) = self.conversation_summary() {
                if existing.id != segment.id {
                    return Err(TypesError::MultipleConversationSummaries);
                }
            }
        }
        self.segments.insert(segment.id.clone(), segment);
        Ok(())
    }

    pub fn remove(&mut self, id: &SegmentId) -> Option<ContextSegment> {
        self.segments.remove(id)
    }

    pub fn get(&self, id: &SegmentId) -> Option<&ContextSegment> {
        self.segments.get(id)
    }

    pub fn get_mut(&mut self, id: &SegmentId) -> Option<&mut ContextSegment> {
        self.segments.get_mut(id)
    }

    pub fn contains(&self, id: &SegmentId) -> bool {
        self.segments.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextSegment> {
        self.segments.values()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn conversation_summary(&self) -> Option<&ContextSegment> {
        self.segments.values().find(|s| s.kind == SegmentKind::ConversationSummary)
    }

    pub fn total_tokens(&self) -> u64 {
        self.segments.values().map(|s| s.token_count as u64).sum()
    }

    /// Ascending priority, then ascending `last_used_at` — the curator's
    /// processing order (spec §4.6).
    pub fn ascending_priority_then_lru(&self) -> Vec<&ContextSegment> {
        let mut segs: Vec<&ContextSegment> = self.segments.values().collect();
        segs.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.last_used_at.cmp(&b.last_used_at)));
        segs
    }
}

/// The five PRP states (spec §4.4). Initial state is `Hypothesize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrpPhase {
    Hypothesize,
    Execute,
    Test,
    Conclude,
    Propose,
}

impl Default for PrpPhase {
    fn default() -> Self {
        PrpPhase::Hypothesize
    }
}

/// Outcome of a refinement ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    Proposed,
    Succeeded,
    Failed,
    Rejected,
}

/// Reason the runtime cannot progress (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionMode {
    None,
    ContextSaturation,
    RetryDepletion,
    ToolBackpressure,
    LlmStop,
    TestFailure,
    HypothesisExhausted,
    PredictedExhaustion,
}

impl Default for ExhaustionMode {
    fn default() -> Self {
        ExhaustionMode::None
    }
}

/// Recovery action taken in response to an exhaustion mode change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub at: DateTime<Utc>,
    pub from_mode: ExhaustionMode,
    pub to_mode: ExhaustionMode,
    pub action: String,
}

/// Exhaustion tracking (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExhaustionState {
    pub mode: ExhaustionMode,
    pub probability: f64,
    pub recovery_log: Vec<RecoveryAction>,
}

impl ExhaustionState {
    /// Sets the mode, logging a recovery action iff the mode actually changed
    /// (spec §4.6 "Exhaustion update").
    pub fn set_mode(&mut self, mode: ExhaustionMode, probability: f64, action: impl Into<String>) {
        if mode != self.mode {
            self.recovery_log.push(RecoveryAction {
                at: Utc::now(),
                from_mode: self.mode,
                to_mode: mode,
                action: action.into(),
            });
            self.mode = mode;
        }
        self.probability = probability;
    }
}

/// A refinement ledger entry (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementLedgerEntry {
    pub cycle_id: u64,
    pub timestamp: DateTime<Utc>,
    pub hypothesis: String,
    pub status: RefinementStatus,
    pub outcome_summary: Option<String>,
    pub exhaustion_trigger: Option<ExhaustionMode>,
    pub test_results: Option<serde_json::Value>,
    pub strategy: Option<String>,
    pub novelty_score: f64,
    pub dependencies: Vec<u64>,
    pub predicted_success_probability: f64,
    pub causal_links: Vec<u64>,
}

/// Critique backlog entry (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueEntry {
    pub category: String,
    pub severity: Severity,
    pub rationale: String,
    pub derived_tests: Vec<String>,
}

/// Invariant-tracking flags checked at TEST → CONCLUDE (spec §4.4/§8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvariantState {
    pub needs_test_after_rejection: bool,
    pub context_updated_in_cycle: bool,
    pub skepticism_gate_satisfied: bool,
    pub violation_log: Vec<String>,
}

/// False-stop and skepticism counters (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutonomyCounters {
    pub false_stop_events: u64,
    pub false_stop_pending: bool,
    pub false_stop_mitigated: u64,
    pub skepticism_challenges: u64,
}

/// One entry of a snapshot manifest (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

/// A workspace snapshot (spec §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub archive_ref: String,
    pub manifest: Vec<ManifestEntry>,
    pub aggregate_checksum: String,
    pub reason: String,
}

/// Maximum number of retained snapshots per session (spec §3: "bounded ring
/// of ≤5 snapshots").
pub const SNAPSHOT_RING_CAPACITY: usize = 5;

/// Workspace descriptor plus bounded snapshot history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceDescriptor {
    pub workspace: String,
    pub snapshots: Vec<SnapshotRecord>,
}

impl WorkspaceDescriptor {
    /// Pushes a snapshot, evicting the oldest once the ring is full.
    pub fn push_snapshot(&mut self, record: SnapshotRecord) {
        if self.snapshots.len() >= SNAPSHOT_RING_CAPACITY {
            self.snapshots.remove(0);
        }
        self.snapshots.push(record);
    }

    pub fn latest_snapshot(&self) -> Option<&SnapshotRecord> {
        self.snapshots.last()
    }
}

/// Token usage recorded for one PRP cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub cycle_id: u64,
    pub messages_tokens: u64,
    pub segments_tokens: u64,
    pub total_sent_to_llm: u64,
}

/// Maximum number of `(recipient, stream_id)` pairs retained per session
/// (spec §4.10 step 6 / §8 S6: "the session's dedupe set"). Bounded the
/// same way the snapshot ring is, to keep the checkpoint from growing
/// unboundedly across a very long-lived session.
pub const PROCESSED_ENVELOPE_RING_CAPACITY: usize = 4096;

/// The durable half of at-least-once delivery (spec §4.10 step 6, §8 S6):
/// the set of `(recipient, stream_id)` pairs already committed to this
/// session's checkpoint, consulted before rerunning the driver on a
/// redelivered envelope. Lives in [`SessionState`] rather than in a
/// process-local cache so a restart after "checkpoint written, ack lost"
/// recognizes the replay instead of reprocessing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedEnvelopeRing {
    seen: Vec<(String, u64)>,
}

impl ProcessedEnvelopeRing {
    pub fn contains(&self, recipient: &str, stream_id: u64) -> bool {
        self.seen.iter().any(|(r, id)| r == recipient && *id == stream_id)
    }

    /// Records `(recipient, stream_id)` as processed, evicting the oldest
    /// entry once the ring is full. A no-op if already present.
    pub fn mark(&mut self, recipient: &str, stream_id: u64) {
        if self.contains(recipient, stream_id) {
            return;
        }
        if self.seen.len() >= PROCESSED_ENVELOPE_RING_CAPACITY {
            self.seen.remove(0);
        }
        self.seen.push((recipient.to_string(), stream_id));
    }
}

/// Durable per-session state (spec §3). Owned exclusively by the runtime
/// loop handling this `session_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub conversation: Vec<Message>,
    pub segments: SegmentStore,
    pub prp_phase: PrpPhase,
    pub cycle_counter: u64,
    pub in_prp: bool,
    pub ledger: Vec<RefinementLedgerEntry>,
    pub critique_backlog: Vec<CritiqueEntry>,
    pub exhaustion: ExhaustionState,
    pub invariants: InvariantState,
    pub autonomy: AutonomyCounters,
    pub workspace: WorkspaceDescriptor,
    pub token_usage: Vec<TokenUsage>,
    /// Artifacts required by the currently active skeptic trigger, if any
    /// (spec §4.7's `required_artifacts`).
    pub required_artifacts: Vec<String>,
    /// Durable dedupe set for at-least-once mailbox delivery (spec §4.10
    /// step 6, §8 S6).
    pub processed_envelopes: ProcessedEnvelopeRing,
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId(String::new())
    }
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    pub fn messages_tokens(&self) -> u64 {
        // Rough token estimate: four characters per token, the way the
        // teacher's context-budget heuristics approximate cost without a
        // tokenizer dependency in the hot path.
        self.conversation.iter().map(|m| (m.content.len() as u64 + 3) / 4).sum()
    }

    pub fn total_context_tokens(&self) -> u64 {
        self.messages_tokens() + self.segments.total_tokens()
    }
}

/// Health status of a registered agent (spec §3/§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Healthy,
    Unhealthy,
}

/// An entry in the agent registry (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub host: String,
    pub port: u16,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub hotpath: bool,
}
