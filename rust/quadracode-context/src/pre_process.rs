//! `pre_process` stage (spec §4.6): token accounting, history compression,
//! curator invocation, hotpath residency probe, and the exhaustion update.
//! Grounded on `knhk-autonomic::monitor::MonitoringComponent`'s collect-
//! then-detect-anomalies shape, generalized from infrastructure metrics to
//! context-budget accounting.

use quadracode_types::{Config, ExhaustionMode, Message, MessageRole, SegmentId, SegmentKind, SessionState};
use tracing::instrument;

use crate::curator::{curate, CurationStep};
use crate::error::Result;
use crate::hotpath::hotpath_violations;
use crate::ports::LlmDriver;

/// What `pre_process` did this turn, reported back to the caller for
/// telemetry (spec §4.6: "all four stages emit one structured telemetry
/// event each").
#[derive(Debug, Clone, Default)]
pub struct PreProcessOutcome {
    pub history_compressed: bool,
    pub curation_steps: Vec<CurationStep>,
    pub hotpath_violations: Vec<String>,
    pub exhaustion_mode: ExhaustionMode,
    pub exhaustion_probability: f64,
}

/// Replace `conversation` with the last `retention_count` messages plus a
/// single leading `conversation-summary` segment covering the rest.
///
/// Triggered when `messages.count > min_compress_count` **or**
/// `messages_tokens > messages_budget` (spec §4.6) — both are strict `>`,
/// so exactly `retention_count` messages never compresses (spec §8
/// boundary behavior).
async fn compress_history(state: &mut SessionState, config: &Config, llm: &dyn LlmDriver) -> Result<bool> {
    let should_compress =
        state.conversation.len() > config.min_compress_count || state.messages_tokens() > config.messages_budget();

    if !should_compress {
        return Ok(false);
    }

    let retention = config.retention_count.min(state.conversation.len());
    let split_at = state.conversation.len() - retention;
    let (to_summarize, to_keep) = state.conversation.split_at(split_at);

    if to_summarize.is_empty() {
        return Ok(false);
    }

    let summary_text = llm.summarize(to_summarize).await?;
    let summary_tokens = ((summary_text.len() as u64 + 3) / 4) as u32;

    let summary_segment = quadracode_types::ContextSegment {
        id: SegmentId::new("conversation-summary"),
        kind: SegmentKind::ConversationSummary,
        content: summary_text,
        token_count: summary_tokens,
        priority: 10,
        compression_eligible: false,
        restorable_reference: String::new(),
        created_at: chrono::Utc::now(),
        last_used_at: chrono::Utc::now(),
    };

    state.segments.upsert(summary_segment)?;
    state.conversation = to_keep.to_vec();
    Ok(true)
}

/// Run the full `pre_process` stage over `state` in place, returning what
/// happened for telemetry.
#[instrument(skip(state, config, llm, registry))]
pub async fn pre_process(
    state: &mut SessionState,
    config: &Config,
    llm: &dyn LlmDriver,
    registry: &quadracode_registry::Registry,
) -> Result<PreProcessOutcome> {
    let mut outcome = PreProcessOutcome::default();

    // Zero messages must never invoke the reducer (spec §8 boundary behavior):
    // `compress_history` already short-circuits on `to_summarize.is_empty()`,
    // and `should_compress` is false when there is nothing to compress.
    outcome.history_compressed = compress_history(state, config, llm).await?;

    if state.segments.total_tokens() > config.optimal_context_size {
        outcome.curation_steps =
            curate(&mut state.segments, config.optimal_context_size, config.externalize_write_enabled, llm).await?;
    }

    outcome.hotpath_violations = hotpath_violations(registry);

    let predicted = quadracode_prp::predicts_exhaustion(state);
    if predicted && state.exhaustion.mode == ExhaustionMode::None {
        state.exhaustion.set_mode(ExhaustionMode::PredictedExhaustion, 1.0, "predicted_exhaustion_from_ledger");
    }
    outcome.exhaustion_mode = state.exhaustion.mode;
    outcome.exhaustion_probability = state.exhaustion.probability;

    Ok(outcome)
}

/// Assistant/user/tool/system message count helper used by callers deciding
/// whether to even invoke `pre_process` on an empty conversation.
pub fn has_any_messages(state: &SessionState) -> bool {
    !state.conversation.is_empty()
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message::new(MessageRole::User, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quadracode_registry::{HealthTimeout, Registry};
    use quadracode_types::SessionId;

    struct CountingLlm {
        summarize_calls: std::sync::atomic::AtomicU64,
    }

    impl CountingLlm {
        fn new() -> Self {
            Self { summarize_calls: std::sync::atomic::AtomicU64::new(0) }
        }
    }

    #[async_trait]
    impl LlmDriver for CountingLlm {
        async fn summarize(&self, _messages: &[Message]) -> Result<String> {
            self.summarize_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok("summary".to_string())
        }

        async fn compress_segment(&self, content: &str) -> Result<String> {
            Ok(content.chars().take(content.len() / 2).collect())
        }

        async fn summarize_segments(&self, _joined: &str) -> Result<String> {
            Ok("merged".to_string())
        }

        async fn run_turn(&self, _prompt: &crate::ports::AssembledPrompt) -> Result<crate::ports::DriverTurn> {
            unreachable!()
        }
    }

    fn config() -> Config {
        let mut c = Config::default();
        c.min_compress_count = 5;
        c.retention_count = 2;
        c
    }

    #[tokio::test]
    async fn zero_messages_never_invokes_reducer() {
        let mut state = SessionState::new(SessionId::new("s"));
        let llm = CountingLlm::new();
        let registry = Registry::new(HealthTimeout::default());
        pre_process(&mut state, &config(), &llm, &registry).await.unwrap();
        assert_eq!(llm.summarize_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exactly_retention_count_messages_does_not_compress() {
        let mut state = SessionState::new(SessionId::new("s"));
        for i in 0..config().retention_count {
            state.conversation.push(user_message(format!("m{i}")));
        }
        let llm = CountingLlm::new();
        let registry = Registry::new(HealthTimeout::default());
        let outcome = pre_process(&mut state, &config(), &llm, &registry).await.unwrap();
        assert!(!outcome.history_compressed);
    }

    #[tokio::test]
    async fn exceeding_min_compress_count_triggers_compression() {
        let mut state = SessionState::new(SessionId::new("s"));
        for i in 0..10 {
            state.conversation.push(user_message(format!("message {i}")));
        }
        let llm = CountingLlm::new();
        let registry = Registry::new(HealthTimeout::default());
        let outcome = pre_process(&mut state, &config(), &llm, &registry).await.unwrap();
        assert!(outcome.history_compressed);
        assert_eq!(state.conversation.len(), config().retention_count);
        assert!(state.segments.conversation_summary().is_some());
    }
}
