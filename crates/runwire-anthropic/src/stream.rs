//! SSE stream translation for the Anthropic Messages API.
//!
//! Converts a raw `reqwest::Response` byte stream into an [`EventStream`]
//! of normalized [`RunEvent`]s. Handles UTF-8 boundary splitting (via the
//! shared [`FrameAccumulator`]), tool-call accumulation across multiple
//! delta events, thinking blocks, and stop-reason mapping.

use std::collections::HashMap;

use futures::stream::StreamExt;
use runwire::event::{new_message_id, new_step_id};
use runwire::sse::{FrameAccumulator, extract_data_line};
use runwire::{AiError, EventStream, FinishReason, RunEvent, UsageInfo};
use serde_json::Value;

use crate::types::StreamResponse;

/// Per-run translation state threaded through the byte-stream fold.
#[derive(Debug)]
pub(crate) struct RunState {
    run_id: String,
    model: Option<String>,
    message_id: String,
    text_started: bool,
    text_ended: bool,
    content: String,
    step_id: Option<String>,
    thinking: String,
    /// In-flight tool-use blocks keyed by content-block index.
    tools: HashMap<u32, ToolUseState>,
    finished: bool,
}

#[derive(Debug)]
struct ToolUseState {
    id: String,
    name: String,
    args: String,
    started: bool,
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
            step_id: None,
            thinking: String::new(),
            tools: HashMap::new(),
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
///
/// Frames we don't care about (pings, `message_start`) produce nothing.
pub(crate) fn parse_sse_event(frame: &str, state: &mut RunState) -> Vec<RunEvent> {
    let Some(data) = extract_data_line(frame) else {
        return vec![];
    };
    if data == "[DONE]" {
        return vec![];
    }
    let Ok(response) = serde_json::from_str::<StreamResponse>(data) else {
        return vec![];
    };

    match response.event_type.as_str() {
        "content_block_start" => handle_block_start(&response, state),
        "content_block_delta" => handle_block_delta(&response, state),
        "content_block_stop" => handle_block_stop(&response, state),
        "message_delta" => handle_message_delta(&response, state),
        "message_stop" => handle_message_stop(state),
        _ => vec![],
    }
}

fn handle_block_start(response: &StreamResponse, state: &mut RunState) -> Vec<RunEvent> {
    let (Some(index), Some(block)) = (response.index, &response.content_block) else {
        return vec![];
    };

    match block.block_type.as_str() {
        "tool_use" => {
            state.tools.insert(
                index,
                ToolUseState {
                    id: block.id.clone().unwrap_or_default(),
                    name: block.name.clone().unwrap_or_default(),
                    args: String::new(),
                    started: false,
                },
            );
            vec![]
        }
        "thinking" => {
            state.thinking.clear();
            let step_id = new_step_id();
            state.step_id = Some(step_id.clone());
            vec![RunEvent::StepStarted {
                step_id,
                timestamp: runwire::event::now_ms(),
                model: state.model.clone(),
                step_type: Some("thinking".into()),
            }]
        }
        _ => vec![],
    }
}

fn handle_block_delta(response: &StreamResponse, state: &mut RunState) -> Vec<RunEvent> {
    let (Some(index), Some(delta)) = (response.index, &response.delta) else {
        return vec![];
    };

    match delta.delta_type.as_deref() {
        Some("text_delta") => {
            let Some(text) = &delta.text else {
                return vec![];
            };
            let mut events = Vec::new();
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
            events
        }
        Some("thinking_delta") => {
            let text = delta.thinking.clone().unwrap_or_default();
            state.thinking.push_str(&text);
            let step_id = state.step_id.clone().unwrap_or_else(new_step_id);
            vec![RunEvent::StepFinished {
                step_id,
                timestamp: runwire::event::now_ms(),
                model: state.model.clone(),
                delta: Some(text),
                content: Some(state.thinking.clone()),
            }]
        }
        Some("input_json_delta") => {
            let Some(partial) = &delta.partial_json else {
                return vec![];
            };
            let Some(tool) = state.tools.get_mut(&index) else {
                return vec![];
            };
            let mut events = Vec::new();
            if !tool.started {
                tool.started = true;
                events.push(RunEvent::tool_call_start(
                    tool.id.clone(),
                    tool.name.clone(),
                    state.model.clone(),
                    Some(index),
                ));
            }
            tool.args.push_str(partial);
            events.push(RunEvent::tool_call_args(
                tool.id.clone(),
                state.model.clone(),
                partial.clone(),
                tool.args.clone(),
            ));
            events
        }
        _ => vec![],
    }
}

fn handle_block_stop(response: &StreamResponse, state: &mut RunState) -> Vec<RunEvent> {
    let Some(index) = response.index else {
        return vec![];
    };

    if let Some(tool) = state.tools.remove(&index) {
        let mut events = Vec::new();
        // A tool with no arguments never saw a delta; open it now.
        if !tool.started {
            events.push(RunEvent::tool_call_start(
                tool.id.clone(),
                tool.name.clone(),
                state.model.clone(),
                Some(index),
            ));
        }
        let input: Option<Value> = if tool.args.is_empty() {
            Some(Value::Object(serde_json::Map::new()))
        } else {
            serde_json::from_str(&tool.args).ok()
        };
        events.push(RunEvent::tool_call_end(
            tool.id,
            tool.name,
            state.model.clone(),
            input,
        ));
        return events;
    }

    if state.text_started && !state.text_ended {
        state.text_ended = true;
        return vec![RunEvent::text_message_end(
            state.message_id.clone(),
            state.model.clone(),
        )];
    }
    vec![]
}

fn handle_message_delta(response: &StreamResponse, state: &mut RunState) -> Vec<RunEvent> {
    let Some(delta) = &response.delta else {
        return vec![];
    };
    let Some(stop_reason) = &delta.stop_reason else {
        return vec![];
    };

    let mut events = Vec::new();
    if state.text_started && !state.text_ended {
        state.text_ended = true;
        events.push(RunEvent::text_message_end(
            state.message_id.clone(),
            state.model.clone(),
        ));
    }

    let usage = response.usage.as_ref().map(|u| UsageInfo::new(u.input_tokens, u.output_tokens));
    state.finished = true;

    // Truncation is an error, never a successful finish.
    if stop_reason == "max_tokens" {
        events.push(RunEvent::run_error(
            Some(state.run_id.clone()),
            state.model.clone(),
            AiError::Truncated.to_error_info(),
        ));
        return events;
    }

    let finish_reason = match stop_reason.as_str() {
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    };
    events.push(RunEvent::run_finished(
        state.run_id.clone(),
        state.model.clone(),
        Some(finish_reason),
        usage,
    ));
    events
}

fn handle_message_stop(state: &mut RunState) -> Vec<RunEvent> {
    // `message_delta` normally carries the stop reason; this is the
    // fallback when a stream ends without one.
    if state.finished {
        return vec![];
    }
    state.finished = true;
    let mut events = Vec::new();
    if state.text_started && !state.text_ended {
        state.text_ended = true;
        events.push(RunEvent::text_message_end(
            state.message_id.clone(),
            state.model.clone(),
        ));
    }
    events.push(RunEvent::run_finished(
        state.run_id.clone(),
        state.model.clone(),
        Some(FinishReason::Stop),
        None,
    ));
    events
}
