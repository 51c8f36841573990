//! `driver` stage (spec §4.6): assembles the final system prompt, invokes
//! the LLM, and detects false stops. Grounded on
//! `knhk-autonomic::execute::ExecutionComponent::execute_plan`'s
//! run-then-capture-feedback shape.

use quadracode_types::{Message, SessionState};
use tracing::{instrument, warn};

use crate::error::Result;
use crate::govern::PromptOutline;
use crate::ports::{AssembledPrompt, DriverTurn, LlmDriver};

const REQUEST_FINAL_REVIEW_TOOL: &str = "request_final_review";

/// What happened during one `driver` invocation.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub turn: DriverTurn,
    /// True iff this turn was a false stop (spec §4.6/§7): a completion
    /// proposal made without passing tests or without the artifacts
    /// declared by the active skeptic trigger.
    pub false_stop: bool,
}

fn is_false_stop(turn: &DriverTurn, required_artifacts: &[String]) -> bool {
    let Some(call) = turn.tool_calls.iter().find(|c| c.name == REQUEST_FINAL_REVIEW_TOOL) else {
        return false;
    };

    let has_passing_tests = call
        .arguments
        .get("test_results")
        .map(|v| !v.is_null())
        .unwrap_or(false);

    let declared_artifacts: Vec<String> = call
        .arguments
        .get("artifacts")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let all_required_present = required_artifacts.iter().all(|req| declared_artifacts.contains(req));

    !(has_passing_tests && all_required_present)
}

/// Build the final system prompt: base prompt + memory block (the
/// `conversation-summary` content, if any) + ordered segments +
/// deliberative plan + memory guidance (spec §4.6).
pub fn assemble_prompt(state: &SessionState, base_prompt: &str, outline: &PromptOutline, memory_guidance: &str) -> AssembledPrompt {
    let memory_block = state
        .segments
        .conversation_summary()
        .map(|s| format!("## Conversation memory\n{}", s.content))
        .unwrap_or_default();

    let ordered_segments: String = outline
        .ordered_segment_ids
        .iter()
        .filter_map(|id| state.segments.get(id))
        .map(|s| format!("### [{:?}] {}\n{}", s.kind, s.id, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let deliberative_plan = format!(
        "## Deliberative plan\ncycle={} phase={:?} focus={:?}",
        state.cycle_counter, state.prp_phase, outline.focus_segment_id
    );

    let system_prompt = [base_prompt, &outline.system_banner, &memory_block, &ordered_segments, &deliberative_plan, memory_guidance]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    AssembledPrompt { system_prompt, messages: state.conversation.clone() }
}

/// Run the `driver` stage: invoke the LLM and flag false stops in place on
/// `state` (increments `false_stop_events`, sets `needs_test_after_rejection`).
#[instrument(skip(state, llm, prompt))]
pub async fn drive(state: &mut SessionState, llm: &dyn LlmDriver, prompt: &AssembledPrompt) -> Result<DriverOutcome> {
    let turn = llm.run_turn(prompt).await?;
    let false_stop = is_false_stop(&turn, &state.required_artifacts);

    if false_stop {
        warn!(session_id = %state.session_id, "false stop detected, routing to skeptic");
        state.autonomy.false_stop_events += 1;
        state.autonomy.false_stop_pending = true;
        state.invariants.needs_test_after_rejection = true;
    } else if state.autonomy.false_stop_pending {
        // This turn carried test results and the declared artifacts: the
        // prior false stop is mitigated (spec §7).
        let mitigated = turn
            .tool_calls
            .iter()
            .any(|c| c.arguments.get("test_results").map(|v| !v.is_null()).unwrap_or(false));
        if mitigated {
            state.autonomy.false_stop_mitigated += 1;
            state.autonomy.false_stop_pending = false;
        }
    }

    Ok(DriverOutcome { turn, false_stop })
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message::new(quadracode_types::MessageRole::Assistant, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quadracode_types::SessionId;

    use crate::ports::ToolCall;

    struct ScriptedLlm {
        turns: std::sync::Mutex<std::collections::VecDeque<DriverTurn>>,
    }

    #[async_trait]
    impl LlmDriver for ScriptedLlm {
        async fn summarize(&self, _messages: &[Message]) -> Result<String> {
            Ok(String::new())
        }
        async fn compress_segment(&self, _content: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn summarize_segments(&self, _joined: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn run_turn(&self, _prompt: &AssembledPrompt) -> Result<DriverTurn> {
            Ok(self.turns.lock().unwrap().pop_front().expect("scripted turn"))
        }
    }

    fn outline() -> PromptOutline {
        PromptOutline { system_banner: "banner".into(), focus_segment_id: None, ordered_segment_ids: vec![] }
    }

    #[tokio::test]
    async fn request_final_review_without_tests_is_a_false_stop() {
        let mut state = SessionState::new(SessionId::new("s-1"));
        let llm = ScriptedLlm {
            turns: std::sync::Mutex::new(
                vec![DriverTurn {
                    assistant_message: "done".into(),
                    tool_calls: vec![ToolCall { name: REQUEST_FINAL_REVIEW_TOOL.into(), arguments: serde_json::json!({"test_results": null}) }],
                }]
                .into(),
            ),
        };
        let prompt = assemble_prompt(&state, "base", &outline(), "guidance");
        let outcome = drive(&mut state, &llm, &prompt).await.unwrap();
        assert!(outcome.false_stop);
        assert_eq!(state.autonomy.false_stop_events, 1);
        assert!(state.invariants.needs_test_after_rejection);
    }

    #[tokio::test]
    async fn request_final_review_with_tests_and_artifacts_is_not_a_false_stop() {
        let mut state = SessionState::new(SessionId::new("s-1"));
        state.required_artifacts = vec!["unit_tests".into()];
        let llm = ScriptedLlm {
            turns: std::sync::Mutex::new(
                vec![DriverTurn {
                    assistant_message: "done".into(),
                    tool_calls: vec![ToolCall {
                        name: REQUEST_FINAL_REVIEW_TOOL.into(),
                        arguments: serde_json::json!({"test_results": {"passed": 5, "failed": 0}, "artifacts": ["unit_tests"]}),
                    }],
                }]
                .into(),
            ),
        };
        let prompt = assemble_prompt(&state, "base", &outline(), "guidance");
        let outcome = drive(&mut state, &llm, &prompt).await.unwrap();
        assert!(!outcome.false_stop);
    }
}
