//! Batch tool execution.

use futures::{StreamExt, stream};

use super::{ToolCtx, ToolRegistry};
use crate::message::{ToolCall, ToolCallResult};

/// The outcome of processing one batch of tool calls.
///
/// Calls that could run immediately have their results in `results`
/// (call order preserved). Gated and client calls are handed back to the
/// loop, which parks them until a decision or a client result arrives.
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub results: Vec<ToolCallResult>,
    /// Calls whose definition requires an approval decision.
    pub needs_approval: Vec<ToolCall>,
    /// Calls for client tools, executed outside the loop.
    pub needs_client: Vec<ToolCall>,
}

/// Partitions and executes a batch of tool calls.
///
/// Non-gated server calls execute concurrently; results come back in call
/// order. Gated and client calls are returned unexecuted — mixing gated
/// and non-gated calls in one batch never delays the non-gated ones.
pub async fn execute_tool_calls(
    registry: &ToolRegistry,
    calls: Vec<ToolCall>,
    ctx: &ToolCtx,
) -> ExecutionOutcome {
    let mut outcome = ExecutionOutcome::default();
    let mut runnable = Vec::new();
    for call in calls {
        if registry.is_client(&call.name) {
            outcome.needs_client.push(call);
        } else if registry.needs_approval(&call.name) {
            outcome.needs_approval.push(call);
        } else {
            runnable.push(call);
        }
    }

    if runnable.is_empty() {
        return outcome;
    }
    let concurrency = runnable.len();
    outcome.results = stream::iter(runnable)
        .map(|call| async move { registry.execute_call(&call, ctx).await })
        .buffered(concurrency)
        .collect()
        .await;
    outcome
}
