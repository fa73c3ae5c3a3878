//! Conversion between `runwire` types and the Anthropic wire format.
//!
//! This module is internal — callers interact only with `runwire` types.
//! The adapter uses these functions to build requests and map errors.

use runwire::{AiError, ChatOptions, Message as CoreMessage, Part, Role};
use serde_json::{Value, json};

use crate::config::AnthropicConfig;
use crate::types::{ContentBlock, ErrorResponse, ImageSource, Message, Request, Tool};

// ── Request conversion ─────────────────────────────────────────────

/// Build an Anthropic API request from run options and adapter config.
pub(crate) fn build_request<'a>(
    options: &'a ChatOptions,
    config: &'a AnthropicConfig,
    stream: bool,
) -> Result<Request<'a>, AiError> {
    let messages = convert_messages(&options.messages)?;
    let system = build_system(options);
    let max_tokens = options.max_tokens.unwrap_or(config.max_tokens);
    let tools = if options.tools.is_empty() {
        None
    } else {
        Some(
            options
                .tools
                .iter()
                .map(|t| Tool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: t
                        .input_schema
                        .as_ref()
                        .map_or(&EMPTY_OBJECT_SCHEMA, |s| s.as_value()),
                })
                .collect(),
        )
    };

    Ok(Request {
        model: &config.model,
        messages,
        max_tokens,
        temperature: options.temperature,
        top_p: options.top_p,
        system,
        stream: if stream { Some(true) } else { None },
        tools,
    })
}

static EMPTY_OBJECT_SCHEMA: std::sync::LazyLock<Value> =
    std::sync::LazyLock::new(|| json!({"type": "object", "properties": {}}));

/// Collects the system text: explicit system prompts first, then any
/// system-role messages, then the structured-output instruction when an
/// output schema is set (Anthropic has no native constrained mode).
fn build_system(options: &ChatOptions) -> Option<String> {
    let mut parts: Vec<String> = options.system_prompts.clone();
    for message in &options.messages {
        if message.role == Role::System {
            let text = message.text();
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    if let Some(schema) = &options.output_schema {
        parts.push(format!(
            "Respond with a single JSON object that conforms to this JSON Schema, \
             with no surrounding prose:\n{}",
            schema.as_value()
        ));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Convert core messages to Anthropic message format.
///
/// System messages go through the top-level `system` param, so they are
/// filtered out here. Tool-role messages map to `"user"` role with
/// `tool_result` content blocks, per the Messages API.
fn convert_messages(messages: &[CoreMessage]) -> Result<Vec<Message>, AiError> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let content: Result<Vec<ContentBlock>, AiError> =
                m.parts.iter().map(convert_part).collect();
            Ok(Message {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: content?,
            })
        })
        .collect()
}

fn convert_part(part: &Part) -> Result<ContentBlock, AiError> {
    match part {
        Part::Text { text } => Ok(ContentBlock::Text { text: text.clone() }),
        Part::Image { source, media_type } => Ok(ContentBlock::Image {
            source: ImageSource {
                source_type: "base64",
                media_type: media_type
                    .clone()
                    .unwrap_or_else(|| "image/png".to_string()),
                data: source.clone(),
            },
        }),
        // Thinking text from earlier turns is still useful context, but
        // the API doesn't accept thinking blocks in requests.
        Part::Thinking { text } => Ok(ContentBlock::Text { text: text.clone() }),
        Part::ToolCall(call) => Ok(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.parsed_arguments().unwrap_or_else(|_| json!({})),
        }),
        Part::ToolResult(result) => Ok(ContentBlock::ToolResult {
            tool_use_id: result.tool_call_id.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        }),
        part => Err(AiError::InvalidRequest(format!(
            "unsupported message part: {part:?}"
        ))),
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

    let retryable = matches!(status.as_u16(), 429 | 500 | 502 | 503 | 529);

    AiError::Http {
        status: Some(status),
        message,
        retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwire::tool::ToolDefinition;
    use runwire::{JsonSchema, ToolCall, ToolCallResult};

    #[test]
    fn test_build_request_minimal() {
        let options = ChatOptions {
            messages: vec![CoreMessage::user("Hello")],
            ..Default::default()
        };
        let config = AnthropicConfig::default();
        let req = build_request(&options, &config, false).unwrap();

        assert_eq!(req.model, "claude-sonnet-4-20250514");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.max_tokens, 4096);
        assert!(req.system.is_none());
        assert!(req.stream.is_none());
        assert!(req.tools.is_none());
    }

    #[test]
    fn test_system_prompts_and_messages_merge() {
        let options = ChatOptions {
            messages: vec![CoreMessage::system("Be terse"), CoreMessage::user("Hi")],
            system_prompts: vec!["You are a helpful assistant".into()],
            ..Default::default()
        };
        let config = AnthropicConfig::default();
        let req = build_request(&options, &config, true).unwrap();

        let system = req.system.unwrap();
        assert!(system.starts_with("You are a helpful assistant"));
        assert!(system.contains("Be terse"));
        // System message filtered from the message list.
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.stream, Some(true));
    }

    #[test]
    fn test_output_schema_becomes_system_instruction() {
        let options = ChatOptions {
            messages: vec![CoreMessage::user("Hi")],
            output_schema: Some(JsonSchema::new(json!({"type": "object"}))),
            ..Default::default()
        };
        let config = AnthropicConfig::default();
        let req = build_request(&options, &config, false).unwrap();
        assert!(req.system.unwrap().contains("JSON Schema"));
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let call = ToolCall::new("toolu_1", "get_weather", r#"{"city":"Oslo"}"#);
        let options = ChatOptions {
            messages: vec![
                CoreMessage::user("Weather in Oslo?"),
                CoreMessage::assistant_with_calls("", vec![call]),
                CoreMessage::tool_result(ToolCallResult::ok("toolu_1", "get_weather", "12C")),
            ],
            tools: vec![ToolDefinition::new("get_weather", "Looks up weather")],
            ..Default::default()
        };
        let config = AnthropicConfig::default();
        let req = build_request(&options, &config, false).unwrap();

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[1].role, "assistant");
        assert!(matches!(
            &req.messages[1].content[..],
            [ContentBlock::ToolUse { name, input, .. }]
                if name == "get_weather" && input["city"] == "Oslo"
        ));
        // Tool results travel as user-role tool_result blocks.
        assert_eq!(req.messages[2].role, "user");
        assert!(matches!(
            &req.messages[2].content[..],
            [ContentBlock::ToolResult { tool_use_id, .. }] if tool_use_id == "toolu_1"
        ));
        assert_eq!(req.tools.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_image_part_media_type_defaults_to_png() {
        let block = convert_part(&Part::Image {
            source: "aGVsbG8=".into(),
            media_type: None,
        })
        .unwrap();
        assert!(matches!(
            block,
            ContentBlock::Image { source: ImageSource { media_type, .. } }
                if media_type == "image/png"
        ));

        let block = convert_part(&Part::Image {
            source: "aGVsbG8=".into(),
            media_type: Some("image/jpeg".into()),
        })
        .unwrap();
        assert!(matches!(
            block,
            ContentBlock::Image { source: ImageSource { media_type, .. } }
                if media_type == "image/jpeg"
        ));
    }

    #[test]
    fn test_convert_error_auth() {
        let err = convert_error(
            http::StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "invalid x-api-key"}}"#,
        );
        assert!(matches!(err, AiError::Auth(msg) if msg == "invalid x-api-key"));
    }

    #[test]
    fn test_convert_error_overloaded_is_retryable() {
        let err = convert_error(http::StatusCode::from_u16(529).unwrap(), "overloaded");
        assert!(matches!(err, AiError::Http { retryable: true, .. }));
    }

    #[test]
    fn test_convert_error_bad_request() {
        let err = convert_error(http::StatusCode::BAD_REQUEST, "nope");
        assert!(matches!(err, AiError::InvalidRequest(_)));
    }
}
