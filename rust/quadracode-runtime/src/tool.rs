//! The tool-execution port (spec §1: the tool runtime the driver's tool
//! calls run against is an external collaborator, same as the LLM). The
//! runtime loop drives this port once per tool call in a driver turn and
//! feeds its output into `quadracode_context::post_process`.
//!
//! Kept in this crate rather than `quadracode-context` because the context
//! pipeline's job stops at "a tool call was requested"; dispatching it is
//! the runtime loop's concern, symmetric with the `WorkspaceIntegrityPort`
//! split between `quadracode-context` and `quadracode-workspace`.

use async_trait::async_trait;
use quadracode_context::{ToolCall, ToolResponse};
use quadracode_types::SessionState;

use crate::error::Result;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, state: &SessionState, call: &ToolCall) -> Result<ToolResponse>;
}

/// Echoes a tool call's own arguments back as its result. Useful for tests
/// and for driver turns that already carry their own result payload (e.g. a
/// scripted `run_full_test_suite` call whose `arguments` is the test
/// report); a deployment with a real tool runtime swaps this for one that
/// actually dispatches the named tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoToolExecutor;

#[async_trait]
impl ToolExecutor for EchoToolExecutor {
    async fn execute(&self, _state: &SessionState, call: &ToolCall) -> Result<ToolResponse> {
        Ok(ToolResponse { tool_name: call.name.clone(), payload: call.arguments.clone() })
    }
}
