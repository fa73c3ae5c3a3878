//! SSE stream translation for the `OpenAI` Chat Completions API.
//!
//! Converts a raw `reqwest::Response` byte stream into an [`EventStream`]
//! of normalized [`RunEvent`]s. Handles UTF-8 boundary splitting (via the
//! shared [`FrameAccumulator`]), tool-call demuxing by fragment index,
//! and the deferred usage chunk that `stream_options.include_usage`
//! delivers after the finish chunk.

use std::collections::HashMap;

use futures::stream::StreamExt;
use runwire::event::new_message_id;
use runwire::sse::{FrameAccumulator, extract_data_line};
use runwire::{AiError, EventStream, FinishReason, RunEvent, UsageInfo};
use serde_json::{Value, json};

use crate::types::{StreamChunk, StreamToolCall};

/// Per-run translation state threaded through the byte-stream fold.
#[derive(Debug)]
pub(crate) struct RunState {
    run_id: String,
    model: Option<String>,
    message_id: String,
    text_started: bool,
    text_ended: bool,
    content: String,
    /// In-flight tool calls keyed by fragment index.
    tools: HashMap<u32, ToolCallState>,
    /// Finish reason seen but not yet emitted; the usage chunk (or the
    /// `[DONE]` sentinel) releases it.
    pending_finish: Option<FinishReason>,
    usage: Option<UsageInfo>,
    finished: bool,
}

#[derive(Debug)]
struct ToolCallState {
    id: String,
    name: String,
    args: String,
}

impl RunState {
    pub(crate) fn new(run_id: String, model: String) -> Self {
        Self {
            run_id,
            model: Some(model),
            message_id: new_message_id(),
            text_started: false,
            text_ended: false,
            content: String::new(),
            tools: HashMap::new(),
            pending_finish: None,
            usage: None,
            finished: false,
        }
    }
}

/// Convert a reqwest SSE response into an [`EventStream`].
///
/// The response must have been initiated with `stream: true`. Chunks are
/// processed as they arrive; nothing is buffered beyond frame boundaries.
pub(crate) fn into_stream(response: reqwest::Response, run_id: String, model: String) -> EventStream {
    let opening = RunEvent::run_started(run_id.clone(), Some(model.clone()));
    let state = RunState::new(run_id, model);

    let events = response
        .bytes_stream()
        .scan(
            (FrameAccumulator::new(), state),
            |(frames, state), chunk| {
                let out = match chunk {
                    Ok(bytes) => match frames.feed(&bytes) {
                        Ok(texts) => texts
                            .iter()
                            .flat_map(|frame| parse_sse_event(frame, state))
                            .collect(),
                        Err(err) => vec![stream_error(state, &err)],
                    },
                    Err(err) => vec![stream_error(
                        state,
                        &AiError::Http {
                            status: None,
                            message: format!("stream read error: {err}"),
                            retryable: true,
                        },
                    )],
                };
                futures::future::ready(Some(out))
            },
        )
        .flat_map(futures::stream::iter);

    Box::pin(futures::stream::once(async move { opening }).chain(events))
}

fn stream_error(state: &RunState, err: &AiError) -> RunEvent {
    RunEvent::run_error(Some(state.run_id.clone()), state.model.clone(), err.to_error_info())
}

/// Parse one SSE frame into zero or more run events.
pub(crate) fn parse_sse_event(frame: &str, state: &mut RunState) -> Vec<RunEvent> {
    let Some(data) = extract_data_line(frame) else {
        return vec![];
    };
    if data == "[DONE]" {
        return flush_finish(state);
    }
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        return vec![];
    };

    if let Some(usage) = &chunk.usage {
        state.usage = Some(UsageInfo {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });
    }

    let mut events = Vec::new();

    if let Some(choice) = chunk.choices.first() {
        if let Some(text) = &choice.delta.content {
            if !text.is_empty() {
                if !state.text_started {
                    state.text_started = true;
                    events.push(RunEvent::text_message_start(
                        state.message_id.clone(),
                        state.model.clone(),
                    ));
                }
                state.content.push_str(text);
                events.push(RunEvent::text_message_content(
                    state.message_id.clone(),
                    state.model.clone(),
                    text.clone(),
                    state.content.clone(),
                ));
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for fragment in tool_calls {
                events.extend(handle_tool_fragment(fragment, state));
            }
        }

        if let Some(reason) = &choice.finish_reason {
            events.extend(handle_finish_reason(reason, state));
        }
    }

    // The usage chunk arrives after the finish chunk with empty choices;
    // release the held finish once it lands.
    if state.pending_finish.is_some() && state.usage.is_some() {
        events.extend(flush_finish(state));
    }

    events
}

/// The first fragment for an index carries `id` and `name`; later
/// fragments append argument text.
fn handle_tool_fragment(fragment: &StreamToolCall, state: &mut RunState) -> Vec<RunEvent> {
    let mut events = Vec::new();
    let index = fragment.index;

    if let Some(id) = &fragment.id {
        let name = fragment
            .function
            .as_ref()
            .and_then(|f| f.name.clone())
            .unwrap_or_default();
        state.tools.insert(
            index,
            ToolCallState {
                id: id.clone(),
                name: name.clone(),
                args: String::new(),
            },
        );
        events.push(RunEvent::tool_call_start(
            id.clone(),
            name,
            state.model.clone(),
            Some(index),
        ));
    }

    if let Some(args) = fragment.function.as_ref().and_then(|f| f.arguments.as_ref()) {
        if !args.is_empty() {
            if let Some(tool) = state.tools.get_mut(&index) {
                tool.args.push_str(args);
                events.push(RunEvent::tool_call_args(
                    tool.id.clone(),
                    state.model.clone(),
                    args.clone(),
                    tool.args.clone(),
                ));
            }
        }
    }

    events
}

fn handle_finish_reason(reason: &str, state: &mut RunState) -> Vec<RunEvent> {
    let mut events = close_open_blocks(state);

    if reason == "length" {
        state.finished = true;
        state.pending_finish = None;
        events.push(stream_error(state, &AiError::Truncated));
        return events;
    }

    state.pending_finish = Some(match reason {
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    });
    events
}

/// Close the text message and emit `TOOL_CALL_END` for every in-flight
/// call, in fragment-index order.
fn close_open_blocks(state: &mut RunState) -> Vec<RunEvent> {
    let mut events = Vec::new();

    let mut indices: Vec<u32> = state.tools.keys().copied().collect();
    indices.sort_unstable();
    for index in indices {
        if let Some(tool) = state.tools.remove(&index) {
            // Malformed accumulated arguments surface as an absent input
            // rather than a fabricated empty object.
            let input: Option<Value> = if tool.args.is_empty() {
                Some(json!({}))
            } else {
                serde_json::from_str(&tool.args).ok()
            };
            events.push(RunEvent::tool_call_end(
                tool.id,
                tool.name,
                state.model.clone(),
                input,
            ));
        }
    }

    if state.text_started && !state.text_ended {
        state.text_ended = true;
        events.push(RunEvent::text_message_end(
            state.message_id.clone(),
            state.model.clone(),
        ));
    }

    events
}

/// Emit the held `RUN_FINISHED`, attaching usage if it has arrived.
fn flush_finish(state: &mut RunState) -> Vec<RunEvent> {
    if state.finished {
        return vec![];
    }
    let Some(reason) = state.pending_finish.take() else {
        return vec![];
    };
    state.finished = true;
    vec![RunEvent::run_finished(
        state.run_id.clone(),
        state.model.clone(),
        Some(reason),
        state.usage.take(),
    )]
}
