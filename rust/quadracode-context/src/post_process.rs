//! `post_process` / `handle_tool_response` stage (spec §4.6): normalizes
//! tool outputs, emits mandatory skepticism challenges, captures test
//! results, and calls into Workspace Integrity on an exhaustion-mode
//! change. Grounded on `knhk-autonomic::execute::ExecutionComponent`'s
//! feed-results-back-to-knowledge-base shape.

use quadracode_types::{CritiqueEntry, ExhaustionMode, Message, MessageRole, Severity, SessionState};
use tracing::instrument;

use crate::error::Result;
use crate::ports::WorkspaceIntegrityPort;

/// One tool's raw output, prior to normalization into a [`Message`].
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub tool_name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessOutcome {
    pub tool_messages: Vec<Message>,
    pub challenge_emitted: bool,
    pub test_results_captured: Option<serde_json::Value>,
}

fn infer_severity(rationale: &str) -> Severity {
    let lower = rationale.to_lowercase();
    if lower.contains("fail") || lower.contains("crash") || lower.contains("security") {
        Severity::High
    } else if lower.contains("flaky") || lower.contains("partial") {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Synthesize the mandatory skepticism challenge for one tool response
/// (spec §4.6: emitted "on every tool response ... unless a prior challenge
/// already satisfied the gate in this cycle").
fn mandatory_challenge(tool_response: &ToolResponse) -> CritiqueEntry {
    let rationale = format!("automatic skepticism challenge on tool `{}` response", tool_response.tool_name);
    CritiqueEntry {
        category: "mandatory_skepticism".to_string(),
        severity: infer_severity(&tool_response.payload.to_string()),
        rationale,
        derived_tests: Vec::new(),
    }
}

fn looks_like_test_results(payload: &serde_json::Value) -> bool {
    payload.get("passed").is_some() || payload.get("failed").is_some() || payload.get("test_results").is_some()
}

/// Run `post_process` over the tool responses produced by this turn,
/// mutating `state` in place.
#[instrument(skip(state, tool_responses, workspace))]
pub async fn post_process(
    state: &mut SessionState,
    tool_responses: Vec<ToolResponse>,
    workspace: &dyn WorkspaceIntegrityPort,
    exhaustion_mode_before: ExhaustionMode,
) -> Result<PostProcessOutcome> {
    let mut outcome = PostProcessOutcome::default();

    for response in &tool_responses {
        let mut message = Message::new(MessageRole::Tool, serde_json::to_string(&response.payload).unwrap_or_default());
        message.tool_name = Some(response.tool_name.clone());
        outcome.tool_messages.push(message.clone());
        state.conversation.push(message);

        if looks_like_test_results(&response.payload) {
            outcome.test_results_captured = Some(response.payload.clone());
        }

        if !state.invariants.skepticism_gate_satisfied {
            let challenge = mandatory_challenge(response);
            state.critique_backlog.push(challenge);
            state.invariants.skepticism_gate_satisfied = true;
            state.autonomy.skepticism_challenges += 1;
            outcome.challenge_emitted = true;
        }
    }

    state.invariants.context_updated_in_cycle = true;

    if state.exhaustion.mode != exhaustion_mode_before {
        workspace.validate_on_exhaustion_change(&state.workspace.workspace).await?;
    }

    Ok(outcome)
}
