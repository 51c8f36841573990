//! Pluggable ports the context engine drives but does not implement: the
//! LLM call, the history reducer, the quality scorer, and the segment
//! governor. Grounded on `knhk-autonomic`'s component-trait split (Monitor/
//! Analyze/Plan/Execute each behind their own struct, swappable in tests)
//! generalized to `async-trait` ports so a test double can stand in for the
//! LLM without touching the pipeline logic.

use async_trait::async_trait;
use quadracode_types::{ContextSegment, Message, SnapshotRecord};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A tool call requested by the driver turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The result of one driver invocation (spec §4.6 "driver").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverTurn {
    pub assistant_message: String,
    pub tool_calls: Vec<ToolCall>,
}

/// The fully assembled prompt handed to the LLM (spec §4.6: "base_prompt +
/// memory block + ordered segments + deliberative plan + memory guidance").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

/// The external LLM provider, treated as a stateless call (spec §1: "not
/// part of the core").
#[async_trait]
pub trait LlmDriver: Send + Sync {
    /// Map-reduce-summarize a run of messages into a single summary string
    /// (spec §4.6 pre_process "history compression").
    async fn summarize(&self, messages: &[Message]) -> Result<String>;

    /// Summarize a single segment's content for the curator's `compress`
    /// decision, preserving meaning at lower token cost.
    async fn compress_segment(&self, content: &str) -> Result<String>;

    /// Roll several segments' joined content into one summary for the
    /// curator's `summarize` decision.
    async fn summarize_segments(&self, joined: &str) -> Result<String>;

    /// Run one driver turn against the assembled prompt.
    async fn run_turn(&self, prompt: &AssembledPrompt) -> Result<DriverTurn>;
}

/// Six-dimension quality score (spec §4.6 "Quality scoring").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub relevance: f64,
    pub coherence: f64,
    pub completeness: f64,
    pub freshness: f64,
    pub diversity: f64,
    pub efficiency: f64,
}

impl QualityScore {
    pub fn overall(&self) -> f64 {
        (self.relevance + self.coherence + self.completeness + self.freshness + self.diversity + self.efficiency) / 6.0
    }
}

/// Pluggable scoring function (spec §4.6: "may use either a heuristic
/// weighted sum or an LLM rubric; the scoring function is pluggable").
pub trait Scorer: Send + Sync {
    fn score(&self, segments: &[ContextSegment]) -> QualityScore;
}

/// Pluggable ordering/inclusion policy for `govern_context` (spec §4.6).
pub trait Governor: Send + Sync {
    /// Must return a subset of `segments`' ids, length at most `max_segments`,
    /// always including any segment with `priority >= critical_priority`.
    fn plan(&self, segments: &[ContextSegment], max_segments: usize, critical_priority: u8) -> Vec<quadracode_types::SegmentId>;
}

/// The narrow slice of Workspace Integrity (C8) that `post_process` needs:
/// validate on every exhaustion-mode change (spec §4.6, §4.8). Kept as a
/// port here rather than a dependency on `quadracode-workspace` so the two
/// crates don't need to know about each other; the runtime loop (C10)
/// wires the concrete implementation in.
#[async_trait]
pub trait WorkspaceIntegrityPort: Send + Sync {
    async fn validate_on_exhaustion_change(&self, workspace: &str) -> Result<()>;

    /// `snapshot(workspace, reason="skeptic_rejection")` (spec §4.8 trigger
    /// policy: "the context engine calls `snapshot(reason="skeptic_rejection")`
    /// on every skeptic-triggered transition"). Returns the new snapshot
    /// record so the caller can fold it into the session's snapshot ring
    /// (spec §3), or `None` when no workspace is registered for this
    /// session.
    async fn snapshot_on_skeptic_rejection(&self, workspace: &str) -> Result<Option<SnapshotRecord>>;
}

/// No-op workspace integrity port for tests and for sessions with no
/// workspace attached.
pub struct NoWorkspaceIntegrity;

#[async_trait]
impl WorkspaceIntegrityPort for NoWorkspaceIntegrity {
    async fn validate_on_exhaustion_change(&self, _workspace: &str) -> Result<()> {
        Ok(())
    }

    async fn snapshot_on_skeptic_rejection(&self, _workspace: &str) -> Result<Option<SnapshotRecord>> {
        Ok(None)
    }
}

/// Placeholder [`LlmDriver`] for a process started with no LLM provider
/// wired in. Summarization passes through its input unchanged and
/// `run_turn` always proposes ending the turn with no tool calls; a real
/// deployment supplies its own driver against whichever provider it
/// targets (spec §1: the LLM provider is an external collaborator, its API
/// shape intentionally unprescribed).
pub struct NullLlmDriver;

#[async_trait]
impl LlmDriver for NullLlmDriver {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        Ok(messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n"))
    }

    async fn compress_segment(&self, content: &str) -> Result<String> {
        Ok(content.to_string())
    }

    async fn summarize_segments(&self, joined: &str) -> Result<String> {
        Ok(joined.to_string())
    }

    async fn run_turn(&self, _prompt: &AssembledPrompt) -> Result<DriverTurn> {
        Ok(DriverTurn { assistant_message: String::new(), tool_calls: Vec::new() })
    }
}
