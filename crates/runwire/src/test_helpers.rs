//! Pre-built helpers for testing code that consumes run events.
//!
//! Available when the `test-utils` feature is enabled, allowing
//! downstream crates to reuse these utilities in their own test suites.
//! Also compiled during `#[cfg(test)]` for this crate's own tests.
//! Provides scripted-run builders and a stream collector for use with
//! [`MockAdapter`](crate::mock::MockAdapter).

use futures::StreamExt;

use crate::error::code;
use crate::event::{ErrorInfo, EventStream, FinishReason, RunEvent, UsageInfo};
use crate::message::ToolCall;

/// A complete text run: start, one message streamed in two deltas, finish
/// with `stop` and sample usage.
pub fn text_run(run_id: &str, text: &str) -> Vec<RunEvent> {
    let message_id = format!("{run_id}-msg");
    let mut split = text.len() / 2;
    while !text.is_char_boundary(split) {
        split -= 1;
    }
    let (head, tail) = text.split_at(split);
    let mut events = vec![
        RunEvent::run_started(run_id, Some("mock-model".into())),
        RunEvent::text_message_start(&message_id, None),
    ];
    if !head.is_empty() {
        events.push(RunEvent::text_message_content(&message_id, None, head, head));
    }
    if !tail.is_empty() {
        events.push(RunEvent::text_message_content(&message_id, None, tail, text));
    }
    events.push(RunEvent::text_message_end(&message_id, None));
    events.push(RunEvent::run_finished(
        run_id,
        Some("mock-model".into()),
        Some(FinishReason::Stop),
        Some(sample_usage()),
    ));
    events
}

/// A run that requests the given tool calls, streaming each call's
/// arguments in two fragments, finishing with `tool_calls`.
pub fn tool_call_run(run_id: &str, calls: &[ToolCall]) -> Vec<RunEvent> {
    let mut events = vec![RunEvent::run_started(run_id, Some("mock-model".into()))];
    for (index, call) in calls.iter().enumerate() {
        events.push(RunEvent::tool_call_start(
            &call.id,
            &call.name,
            None,
            Some(index as u32),
        ));
        let args = call.arguments.as_str();
        let mut split = args.len() / 2;
        while !args.is_char_boundary(split) {
            split -= 1;
        }
        let (head, tail) = args.split_at(split);
        if !head.is_empty() {
            events.push(RunEvent::tool_call_args(&call.id, None, head, head));
        }
        if !tail.is_empty() {
            events.push(RunEvent::tool_call_args(&call.id, None, tail, args));
        }
        events.push(RunEvent::tool_call_end(
            &call.id,
            &call.name,
            None,
            call.parsed_arguments().ok(),
        ));
    }
    events.push(RunEvent::run_finished(
        run_id,
        Some("mock-model".into()),
        Some(FinishReason::ToolCalls),
        Some(sample_usage()),
    ));
    events
}

/// A run that fails with the given error code.
pub fn error_run(run_id: &str, error_code: &str, message: &str) -> Vec<RunEvent> {
    vec![
        RunEvent::run_started(run_id, Some("mock-model".into())),
        RunEvent::run_error(
            Some(run_id.into()),
            Some("mock-model".into()),
            ErrorInfo::with_code(message, error_code),
        ),
    ]
}

/// A run truncated at the token limit.
pub fn truncated_run(run_id: &str) -> Vec<RunEvent> {
    error_run(run_id, code::MAX_TOKENS, "maximum tokens reached")
}

/// A [`UsageInfo`] with 100 prompt / 50 completion tokens.
pub fn sample_usage() -> UsageInfo {
    UsageInfo::new(100, 50)
}

/// Collects a full event stream into a vector.
pub async fn collect_events(events: EventStream) -> Vec<RunEvent> {
    events.collect().await
}

/// The concatenated text deltas of a collected run.
pub fn text_of(events: &[RunEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::TextMessageContent { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}
