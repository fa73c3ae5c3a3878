//! JSON Lines stream translation for the Ollama Chat API.
//!
//! Converts a raw `reqwest::Response` byte stream into an [`EventStream`]
//! of normalized [`RunEvent`]s. Ollama streams JSON Lines (one complete
//! JSON object per line), not SSE, so this module carries its own line
//! splitter with UTF-8 boundary handling.
//!
//! Tool calls arrive whole rather than as argument fragments, so each
//! one expands into an adjacent `TOOL_CALL_START` / `TOOL_CALL_ARGS` /
//! `TOOL_CALL_END` triple.

use futures::stream::StreamExt;
use runwire::event::new_message_id;
use runwire::{AiError, EventStream, FinishReason, RunEvent, UsageInfo};
use serde_json::Value;

use crate::types::{StreamChunk, ToolCallResponse};

/// Upper bound on buffered bytes for a single unfinished line.
const MAX_BUFFER: usize = 16 * 1024 * 1024;

/// Buffers network chunks and yields complete lines, tolerating UTF-8
/// sequences split across chunk boundaries.
#[derive(Debug, Default)]
struct LineAccumulator {
    text: String,
    bytes: Vec<u8>,
}

impl LineAccumulator {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, AiError> {
        if self.text.len() + self.bytes.len() + chunk.len() > MAX_BUFFER {
            return Err(AiError::ResponseFormat {
                message: format!("JSON line exceeds {MAX_BUFFER} byte buffer limit"),
                raw: String::new(),
            });
        }
        self.bytes.extend_from_slice(chunk);
        match std::str::from_utf8(&self.bytes) {
            Ok(valid) => {
                self.text.push_str(valid);
                self.bytes.clear();
            }
            Err(e) => {
                if e.error_len().is_some() {
                    return Err(AiError::ResponseFormat {
                        message: "invalid UTF-8 in response stream".to_owned(),
                        raw: String::new(),
                    });
                }
                let valid_up_to = e.valid_up_to();
                // SAFETY: `valid_up_to` bounds a valid UTF-8 prefix.
                let valid = unsafe { std::str::from_utf8_unchecked(&self.bytes[..valid_up_to]) };
                self.text.push_str(valid);
                self.bytes.drain(..valid_up_to);
            }
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.text.find('\n') {
            let line: String = self.text.drain(..=pos).collect();
            let line = line.trim().to_owned();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

/// Per-run translation state threaded through the byte-stream fold.
#[derive(Debug)]
pub(crate) struct RunState {
    run_id: String,
    model: Option<String>,
    message_id: String,
    text_started: bool,
    content: String,
    /// Calls emitted so far, used to synthesize stable ids and to pick
    /// the finish reason on the done chunk.
    call_count: u32,
    finished: bool,
}

impl RunState {
    pub(crate) fn new(run_id: String, model: String) -> Self {
        Self {
            run_id,
            model: Some(model),
            message_id: new_message_id(),
            text_started: false,
            content: String::new(),
            call_count: 0,
            finished: false,
        }
    }
}

/// Convert a reqwest JSON Lines response into an [`EventStream`].
pub(crate) fn into_stream(response: reqwest::Response, run_id: String, model: String) -> EventStream {
    let opening = RunEvent::run_started(run_id.clone(), Some(model.clone()));
    let state = RunState::new(run_id, model);

    let events = response
        .bytes_stream()
        .scan(
            (LineAccumulator::default(), state),
            |(lines, state), chunk| {
                let out = match chunk {
                    Ok(bytes) => match lines.feed(&bytes) {
                        Ok(texts) => texts
                            .iter()
                            .flat_map(|line| parse_json_line(line, state))
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

/// Parse one JSON line into zero or more run events.
pub(crate) fn parse_json_line(line: &str, state: &mut RunState) -> Vec<RunEvent> {
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(line) else {
        return vec![];
    };

    let mut events = Vec::new();

    if let Some(message) = &chunk.message {
        if let Some(text) = &message.content {
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

        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                events.extend(emit_tool_call(call, state));
            }
        }
    }

    if chunk.done && !state.finished {
        state.finished = true;
        events.extend(finish_run(&chunk, state));
    }

    events
}

/// Expand a complete tool call into its start/args/end triple. Ollama
/// assigns no call ids, so a stable one is synthesized from the name
/// and position.
fn emit_tool_call(call: &ToolCallResponse, state: &mut RunState) -> Vec<RunEvent> {
    let index = state.call_count;
    state.call_count += 1;
    let id = format!("call_{}_{index}", call.function.name);
    let name = call.function.name.clone();

    let input = if call.function.arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        call.function.arguments.clone()
    };
    let args = input.to_string();

    vec![
        RunEvent::tool_call_start(id.clone(), name.clone(), state.model.clone(), Some(index)),
        RunEvent::tool_call_args(id.clone(), state.model.clone(), args.clone(), args),
        RunEvent::tool_call_end(id, name, state.model.clone(), Some(input)),
    ]
}

/// Close the text message and translate the done chunk into a terminal
/// event: `RUN_ERROR` for truncation, `RUN_FINISHED` otherwise.
fn finish_run(chunk: &StreamChunk, state: &mut RunState) -> Vec<RunEvent> {
    let mut events = Vec::new();

    if state.text_started {
        events.push(RunEvent::text_message_end(
            state.message_id.clone(),
            state.model.clone(),
        ));
    }

    if chunk.done_reason.as_deref() == Some("length") {
        events.push(stream_error(state, &AiError::Truncated));
        return events;
    }

    let prompt = chunk.prompt_eval_count.unwrap_or(0);
    let completion = chunk.eval_count.unwrap_or(0);
    let usage = if prompt > 0 || completion > 0 {
        Some(UsageInfo::new(prompt, completion))
    } else {
        None
    };

    let reason = if state.call_count > 0 {
        FinishReason::ToolCalls
    } else {
        FinishReason::Stop
    };

    events.push(RunEvent::run_finished(
        state.run_id.clone(),
        state.model.clone(),
        Some(reason),
        usage,
    ));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunState {
        RunState::new("run_1".into(), "llama3.2".into())
    }

    #[test]
    fn test_text_delta_starts_message_and_accumulates() {
        let mut state = state();
        let events = parse_json_line(
            r#"{"message":{"content":"Hel"},"done":false}"#,
            &mut state,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RunEvent::TextMessageStart { .. }));

        let events = parse_json_line(
            r#"{"message":{"content":"lo"},"done":false}"#,
            &mut state,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RunEvent::TextMessageContent { delta, content, .. }
                if delta == "lo" && content.as_deref() == Some("Hello")
        ));
    }

    #[test]
    fn test_done_chunk_closes_text_and_finishes_with_usage() {
        let mut state = state();
        parse_json_line(r#"{"message":{"content":"hi"},"done":false}"#, &mut state);
        let events = parse_json_line(
            r#"{"message":{"content":""},"done":true,"done_reason":"stop","prompt_eval_count":26,"eval_count":12}"#,
            &mut state,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RunEvent::TextMessageEnd { .. }));
        match &events[1] {
            RunEvent::RunFinished {
                finish_reason,
                usage,
                ..
            } => {
                assert_eq!(*finish_reason, Some(FinishReason::Stop));
                let usage = usage.unwrap();
                assert_eq!(usage.prompt_tokens, 26);
                assert_eq!(usage.completion_tokens, 12);
            }
            other => panic!("expected RUN_FINISHED, got {other:?}"),
        }
    }

    #[test]
    fn test_done_without_usage_has_none() {
        let mut state = state();
        let events = parse_json_line(r#"{"message":{"content":""},"done":true}"#, &mut state);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RunEvent::RunFinished { usage: None, .. }
        ));
    }

    #[test]
    fn test_whole_tool_call_expands_to_triple() {
        let mut state = state();
        let events = parse_json_line(
            r#"{"message":{"content":"","tool_calls":[{"function":{"name":"get_weather","arguments":{"city":"Tokyo"}}}]},"done":false}"#,
            &mut state,
        );
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            RunEvent::ToolCallStart { tool_call_id, tool_name, index, .. }
                if tool_call_id == "call_get_weather_0"
                    && tool_name == "get_weather"
                    && *index == Some(0)
        ));
        assert!(matches!(
            &events[1],
            RunEvent::ToolCallArgs { args, .. }
                if args.as_deref() == Some(r#"{"city":"Tokyo"}"#)
        ));
        assert!(matches!(
            &events[2],
            RunEvent::ToolCallEnd { input, .. }
                if input.as_ref().unwrap()["city"] == "Tokyo"
        ));

        // The done chunk then finishes with tool_calls.
        let events = parse_json_line(r#"{"done":true,"done_reason":"stop"}"#, &mut state);
        assert!(matches!(
            &events[0],
            RunEvent::RunFinished { finish_reason: Some(FinishReason::ToolCalls), .. }
        ));
    }

    #[test]
    fn test_parallel_tool_calls_get_distinct_indices() {
        let mut state = state();
        let events = parse_json_line(
            r#"{"message":{"content":"","tool_calls":[{"function":{"name":"search","arguments":{"q":"rust"}}},{"function":{"name":"calc","arguments":{"expr":"2+2"}}}]},"done":false}"#,
            &mut state,
        );
        assert_eq!(events.len(), 6);
        assert!(matches!(
            &events[0],
            RunEvent::ToolCallStart { tool_call_id, .. } if tool_call_id == "call_search_0"
        ));
        assert!(matches!(
            &events[3],
            RunEvent::ToolCallStart { tool_call_id, index, .. }
                if tool_call_id == "call_calc_1" && *index == Some(1)
        ));
    }

    #[test]
    fn test_null_arguments_become_empty_object() {
        let mut state = state();
        let events = parse_json_line(
            r#"{"message":{"content":"","tool_calls":[{"function":{"name":"ping","arguments":null}}]},"done":false}"#,
            &mut state,
        );
        assert!(matches!(
            &events[2],
            RunEvent::ToolCallEnd { input, .. }
                if input.as_ref().unwrap().as_object().unwrap().is_empty()
        ));
    }

    #[test]
    fn test_length_done_reason_becomes_run_error() {
        let mut state = state();
        parse_json_line(r#"{"message":{"content":"partial"},"done":false}"#, &mut state);
        let events = parse_json_line(
            r#"{"message":{"content":""},"done":true,"done_reason":"length","prompt_eval_count":10,"eval_count":50}"#,
            &mut state,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RunEvent::TextMessageEnd { .. }));
        match &events[1] {
            RunEvent::RunError { error, .. } => {
                assert_eq!(error.code.as_deref(), Some("max_tokens"));
            }
            other => panic!("expected RUN_ERROR, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_line_is_skipped() {
        let mut state = state();
        assert!(parse_json_line("not-json", &mut state).is_empty());
    }

    #[test]
    fn test_line_accumulator_splits_utf8_boundary() {
        let mut lines = LineAccumulator::default();
        let text = "{\"message\":{\"content\":\"é\"},\"done\":false}\n".as_bytes();
        let split = text.iter().position(|b| *b >= 0xC0).unwrap() + 1;
        assert!(lines.feed(&text[..split]).unwrap().is_empty());
        let out = lines.feed(&text[split..]).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].contains('é'));
    }
}
