//! Conversion between `runwire` types and the Ollama wire format.
//!
//! This module is internal — callers interact only with `runwire` types.
//! The adapter uses these functions to build requests and map errors.

use runwire::{AiError, ChatOptions, Message as CoreMessage, Part, Role};
use serde_json::json;

use crate::config::OllamaConfig;
use crate::types::{
    ErrorResponse, FunctionCallRequest, FunctionDef, Message, Options, Request, Tool,
    ToolCallRequest,
};

// ── Request conversion ─────────────────────────────────────────────

/// Build an Ollama API request from run options and adapter config.
///
/// An output schema goes through the native `format` field and is also
/// restated as a system instruction, since smaller local models follow
/// the constraint more reliably when told about it.
pub(crate) fn build_request<'a>(
    options: &'a ChatOptions,
    config: &'a OllamaConfig,
    stream: bool,
) -> Result<Request<'a>, AiError> {
    let converted = convert_messages(&options.messages)?;
    let mut messages = Vec::with_capacity(options.system_prompts.len() + 1 + converted.len());
    for prompt in &options.system_prompts {
        messages.push(Message {
            role: "system",
            content: prompt.clone(),
            images: None,
            tool_calls: None,
        });
    }
    if let Some(schema) = &options.output_schema {
        messages.push(Message {
            role: "system",
            content: format!(
                "Respond with a single JSON object that conforms to this JSON Schema, \
                 with no surrounding prose:\n{}",
                schema.as_value()
            ),
            images: None,
            tool_calls: None,
        });
    }
    messages.extend(converted);

    let tools = if options.tools.is_empty() {
        None
    } else {
        Some(
            options
                .tools
                .iter()
                .map(|t| Tool {
                    tool_type: "function",
                    function: FunctionDef {
                        name: &t.name,
                        description: &t.description,
                        parameters: t
                            .input_schema
                            .as_ref()
                            .map_or(&EMPTY_OBJECT_SCHEMA, |s| s.as_value()),
                    },
                })
                .collect(),
        )
    };

    let generation = if options.temperature.is_some()
        || options.top_p.is_some()
        || options.max_tokens.is_some()
    {
        Some(Options {
            temperature: options.temperature,
            top_p: options.top_p,
            num_predict: options.max_tokens,
        })
    } else {
        None
    };

    let format = options
        .output_schema
        .as_ref()
        .map(|schema| schema.as_value().clone());

    Ok(Request {
        model: config.model.clone(),
        messages,
        stream,
        options: generation,
        tools,
        format,
    })
}

static EMPTY_OBJECT_SCHEMA: std::sync::LazyLock<serde_json::Value> =
    std::sync::LazyLock::new(|| json!({"type": "object", "properties": {}}));

/// Convert core messages to Ollama message format.
///
/// Tool-role messages map to `"tool"` messages carrying the result
/// content. Ollama matches results to calls positionally.
fn convert_messages(messages: &[CoreMessage]) -> Result<Vec<Message>, AiError> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(msg: &CoreMessage) -> Result<Message, AiError> {
    match msg.role {
        Role::System => Ok(Message {
            role: "system",
            content: msg.text(),
            images: None,
            tool_calls: None,
        }),
        Role::User => {
            let images: Vec<String> = msg
                .parts
                .iter()
                .filter_map(|p| {
                    if let Part::Image { source, .. } = p {
                        Some(strip_data_url(source).to_owned())
                    } else {
                        None
                    }
                })
                .collect();
            Ok(Message {
                role: "user",
                content: msg.text(),
                images: if images.is_empty() {
                    None
                } else {
                    Some(images)
                },
                tool_calls: None,
            })
        }
        Role::Assistant => {
            let tool_calls: Vec<ToolCallRequest> = msg
                .tool_calls()
                .map(|call| ToolCallRequest {
                    function: FunctionCallRequest {
                        name: call.name.clone(),
                        arguments: call.parsed_arguments().unwrap_or_else(|_| json!({})),
                    },
                })
                .collect();
            Ok(Message {
                role: "assistant",
                content: msg.text(),
                images: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            })
        }
        Role::Tool => {
            let content = msg
                .tool_results()
                .next()
                .map_or_else(|| msg.text(), |r| r.content.clone());
            Ok(Message {
                role: "tool",
                content,
                images: None,
                tool_calls: None,
            })
        }
    }
}

/// Ollama wants raw base64 in `images`; strip a data-URL wrapper if the
/// caller provided one.
fn strip_data_url(source: &str) -> &str {
    if source.starts_with("data:") {
        source.split_once("base64,").map_or(source, |(_, b64)| b64)
    } else {
        source
    }
}

// ── Error conversion ───────────────────────────────────────────────

/// Map an HTTP error status and body to an [`AiError`].
pub(crate) fn convert_error(status: http::StatusCode, body: &str) -> AiError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map_or_else(|_| body.to_string(), |e| e.error);

    if status == http::StatusCode::NOT_FOUND {
        // Usually a model that hasn't been pulled.
        return AiError::InvalidRequest(message);
    }

    if status == http::StatusCode::BAD_REQUEST {
        return AiError::InvalidRequest(message);
    }

    let retryable = matches!(status.as_u16(), 429 | 500 | 502 | 503);

    AiError::Http {
        status: Some(status),
        message,
        retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwire::{JsonSchema, Message as CoreMessage, ToolCall, ToolCallResult};

    fn options_with(messages: Vec<CoreMessage>) -> ChatOptions {
        ChatOptions {
            messages,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_request_minimal() {
        let config = OllamaConfig::default();
        let options = options_with(vec![CoreMessage::user("Hello")]);
        let req = build_request(&options, &config, true).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_output_schema_sets_format_and_system_instruction() {
        let config = OllamaConfig::default();
        let mut options = options_with(vec![CoreMessage::user("go")]);
        options.output_schema = Some(JsonSchema::new(json!({"type": "object"})));
        let req = build_request(&options, &config, true).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["format"]["type"], "object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(
            json["messages"][0]["content"]
                .as_str()
                .unwrap()
                .contains("JSON Schema")
        );
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let config = OllamaConfig::default();
        let call = ToolCall::new("call_1", "get_weather", r#"{"city":"Oslo"}"#);
        let options = options_with(vec![
            CoreMessage::user("weather?"),
            CoreMessage::assistant_with_calls("", vec![call]),
            CoreMessage::tool_result(ToolCallResult::ok("call_1", "get_weather", r#"{"c":4}"#)),
        ]);
        let req = build_request(&options, &config, true).unwrap();
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(
            json["messages"][1]["tool_calls"][0]["function"]["name"],
            "get_weather"
        );
        assert_eq!(
            json["messages"][1]["tool_calls"][0]["function"]["arguments"]["city"],
            "Oslo"
        );
        assert_eq!(json["messages"][2]["role"], "tool");
        assert_eq!(json["messages"][2]["content"], r#"{"c":4}"#);
    }

    #[test]
    fn test_user_images_are_stripped_to_base64() {
        let config = OllamaConfig::default();
        let message = CoreMessage {
            role: Role::User,
            parts: vec![
                Part::Text {
                    text: "what is this?".into(),
                },
                Part::Image {
                    source: "data:image/png;base64,aGVsbG8=".into(),
                    media_type: Some("image/png".into()),
                },
            ],
        };
        let options = options_with(vec![message]);
        let req = build_request(&options, &config, true).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["images"][0], "aGVsbG8=");
    }

    #[test]
    fn test_convert_error_model_not_found() {
        let err = convert_error(
            http::StatusCode::NOT_FOUND,
            r#"{"error": "model \"nope\" not found, try pulling it first"}"#,
        );
        assert!(matches!(err, AiError::InvalidRequest(msg) if msg.contains("try pulling")));
    }

    #[test]
    fn test_convert_error_server_is_retryable() {
        let err = convert_error(http::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, AiError::Http { retryable: true, .. }));
    }
}
