//! Conversion between `runwire` types and the `OpenAI` wire format.
//!
//! This module is internal — callers interact only with `runwire` types.
//! The adapter uses these functions to build requests and map errors.

use runwire::{AiError, ChatOptions, Message as CoreMessage, Part, Role};
use serde_json::{Value, json};

use crate::config::OpenAiConfig;
use crate::types::{
    ContentPart, ErrorResponse, FunctionCallRequest, FunctionDef, ImageUrl, JsonSchemaFormat,
    Message, MessageContent, Request, ResponseFormat, StreamOptions, Tool, ToolCallRequest,
};

// ── Request conversion ─────────────────────────────────────────────

/// Build a Chat Completions request from run options and adapter config.
pub(crate) fn build_request<'a>(
    options: &'a ChatOptions,
    config: &'a OpenAiConfig,
    stream: bool,
) -> Result<Request<'a>, AiError> {
    // System prompts become leading system messages; system-role messages
    // in the history pass through convert_messages unchanged.
    let converted = convert_messages(&options.messages)?;
    let mut messages = Vec::with_capacity(options.system_prompts.len() + converted.len());
    for prompt in &options.system_prompts {
        messages.push(Message {
            role: "system",
            content: Some(MessageContent::Text(prompt.clone())),
            tool_calls: None,
            tool_call_id: None,
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

    let response_format = options.output_schema.as_ref().map(|schema| ResponseFormat {
        format_type: "json_schema",
        json_schema: Some(JsonSchemaFormat {
            name: "output",
            schema: schema.as_value(),
            strict: true,
        }),
    });

    Ok(Request {
        model: &config.model,
        messages,
        temperature: options.temperature,
        top_p: options.top_p,
        max_completion_tokens: options.max_tokens,
        stream: if stream { Some(true) } else { None },
        stream_options: if stream {
            Some(StreamOptions {
                include_usage: true,
            })
        } else {
            None
        },
        tools,
        response_format,
    })
}

static EMPTY_OBJECT_SCHEMA: std::sync::LazyLock<Value> =
    std::sync::LazyLock::new(|| json!({"type": "object", "properties": {}}));

/// Convert core messages to Chat Completions message format.
///
/// Tool-role messages map to `"tool"` messages carrying `tool_call_id`,
/// one per executed call.
fn convert_messages(messages: &[CoreMessage]) -> Result<Vec<Message>, AiError> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(msg: &CoreMessage) -> Result<Message, AiError> {
    match msg.role {
        Role::System => Ok(Message {
            role: "system",
            content: Some(MessageContent::Text(msg.text())),
            tool_calls: None,
            tool_call_id: None,
        }),
        Role::User => Ok(Message {
            role: "user",
            content: Some(convert_user_content(&msg.parts)),
            tool_calls: None,
            tool_call_id: None,
        }),
        Role::Assistant => {
            // Thinking text from earlier turns is still useful context;
            // the API has no separate channel for it, so fold it in.
            let text = msg
                .parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } | Part::Thinking { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            let tool_calls: Vec<ToolCallRequest> = msg
                .parts
                .iter()
                .filter_map(|p| {
                    if let Part::ToolCall(call) = p {
                        Some(ToolCallRequest {
                            id: call.id.clone(),
                            call_type: "function",
                            function: FunctionCallRequest {
                                name: call.name.clone(),
                                arguments: if call.arguments.is_empty() {
                                    "{}".to_owned()
                                } else {
                                    call.arguments.clone()
                                },
                            },
                        })
                    } else {
                        None
                    }
                })
                .collect();
            Ok(Message {
                role: "assistant",
                content: if text.is_empty() {
                    None
                } else {
                    Some(MessageContent::Text(text))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            })
        }
        Role::Tool => {
            let result = msg.parts.iter().find_map(|p| {
                if let Part::ToolResult(r) = p {
                    Some(r)
                } else {
                    None
                }
            });
            let (content, tool_call_id) = match result {
                Some(r) => (r.content.clone(), Some(r.tool_call_id.clone())),
                None => (msg.text(), None),
            };
            Ok(Message {
                role: "tool",
                content: Some(MessageContent::Text(content)),
                tool_calls: None,
                tool_call_id,
            })
        }
    }
}

/// Convert user message parts to message content. A single text part
/// uses the plain string form; anything else becomes a parts array.
fn convert_user_content(parts: &[Part]) -> MessageContent {
    if let [Part::Text { text }] = parts {
        return MessageContent::Text(text.clone());
    }

    let converted = parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } | Part::Thinking { text } => {
                Some(ContentPart::Text { text: text.clone() })
            }
            Part::Image { source, media_type } => Some(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_url(source, media_type.as_deref()),
                },
            }),
            _ => None,
        })
        .collect();
    MessageContent::Parts(converted)
}

/// Images arrive as either a URL or raw base64; the API wants a URL, so
/// base64 payloads become data URLs.
fn image_url(source: &str, media_type: Option<&str>) -> String {
    if source.starts_with("http://") || source.starts_with("https://") || source.starts_with("data:")
    {
        source.to_owned()
    } else {
        format!("data:{};base64,{source}", media_type.unwrap_or("image/png"))
    }
}

// ── Error conversion ───────────────────────────────────────────────

/// Map an HTTP error status and body to an [`AiError`].
pub(crate) fn convert_error(status: http::StatusCode, body: &str) -> AiError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);

    if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
        return AiError::Auth(message);
    }

    if status == http::StatusCode::BAD_REQUEST {
        return AiError::InvalidRequest(message);
    }

    let retryable = matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503);

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
    use runwire::tool::ToolDefinition;

    fn options_with(messages: Vec<CoreMessage>) -> ChatOptions {
        ChatOptions {
            messages,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_request_minimal() {
        let config = OpenAiConfig::default();
        let options = options_with(vec![CoreMessage::user("Hello")]);
        let req = build_request(&options, &config, true).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_system_prompts_lead_the_message_list() {
        let config = OpenAiConfig::default();
        let mut options = options_with(vec![CoreMessage::user("hi")]);
        options.system_prompts = vec!["Be terse.".into()];
        let req = build_request(&options, &config, false).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "Be terse.");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_output_schema_becomes_response_format() {
        let config = OpenAiConfig::default();
        let mut options = options_with(vec![CoreMessage::user("go")]);
        options.output_schema = Some(JsonSchema::new(json!({"type": "object"})));
        let req = build_request(&options, &config, true).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            json["response_format"]["json_schema"]["schema"]["type"],
            "object"
        );
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let config = OpenAiConfig::default();
        let call = ToolCall::new("call_1", "get_weather", r#"{"city":"Oslo"}"#);
        let options = options_with(vec![
            CoreMessage::user("weather?"),
            CoreMessage::assistant_with_calls("", vec![call]),
            CoreMessage::tool_result(ToolCallResult::ok("call_1", "get_weather", r#"{"c":4}"#)),
        ]);
        let req = build_request(&options, &config, false).unwrap();
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["messages"][1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            json["messages"][1]["tool_calls"][0]["function"]["name"],
            "get_weather"
        );
        assert_eq!(json["messages"][2]["role"], "tool");
        assert_eq!(json["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(json["messages"][2]["content"], r#"{"c":4}"#);
    }

    #[test]
    fn test_tool_definition_without_schema_gets_empty_object() {
        let config = OpenAiConfig::default();
        let mut options = options_with(vec![CoreMessage::user("go")]);
        options.tools = vec![ToolDefinition::new("ping", "Ping")];
        let req = build_request(&options, &config, false).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json["tools"][0]["function"]["parameters"]["type"],
            "object"
        );
    }

    #[test]
    fn test_image_user_content_uses_parts() {
        let config = OpenAiConfig::default();
        let message = CoreMessage {
            role: Role::User,
            parts: vec![
                Part::Text {
                    text: "what is this?".into(),
                },
                Part::Image {
                    source: "aGVsbG8=".into(),
                    media_type: Some("image/jpeg".into()),
                },
            ],
        };
        let options = options_with(vec![message]);
        let req = build_request(&options, &config, false).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,aGVsbG8="
        );
    }

    #[test]
    fn test_convert_error_auth() {
        let err = convert_error(
            http::StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        );
        assert!(matches!(err, AiError::Auth(msg) if msg == "Incorrect API key provided"));
    }

    #[test]
    fn test_convert_error_rate_limit_is_retryable() {
        let err = convert_error(http::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, AiError::Http { retryable: true, .. }));
    }

    #[test]
    fn test_convert_error_bad_request() {
        let err = convert_error(http::StatusCode::BAD_REQUEST, "nope");
        assert!(matches!(err, AiError::InvalidRequest(_)));
    }
}
