//! Adapter trait and request types.
//!
//! This module defines two core abstractions:
//!
//! - **[`Adapter`]** — the trait every backend implements. It uses Rust
//!   2024's native async-fn-in-traits (AFIT), so implementations are
//!   straightforward `async fn`s with no macro overhead.
//!
//! - **[`DynAdapter`]** — an object-safe mirror of `Adapter` that uses
//!   boxed futures. A blanket `impl<T: Adapter> DynAdapter for T` bridges
//!   the two, so any concrete adapter can be stored as
//!   `Box<dyn DynAdapter>` or `Arc<dyn DynAdapter>` with zero boilerplate.
//!
//! # When to use which
//!
//! | Situation | Use |
//! |-----------|-----|
//! | Generic code that knows the concrete type | `Adapter` |
//! | Need to store adapters in a collection or behind `dyn` | `DynAdapter` |
//! | Implementing a new backend | `impl Adapter for MyBackend` |
//!
//! # Streaming is the only path
//!
//! [`Adapter::events`] is the single entry point; the one-shot mode is
//! [`collect_run`], which folds the stream into a [`RunSummary`]. There is
//! no separate non-streaming request path to drift out of sync.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{AiError, code};
use crate::event::{EventStream, FinishReason, RunEvent, UsageInfo};
use crate::message::{Message, ToolCall};
use crate::schema::JsonSchema;
use crate::tool::ToolDefinition;

/// The core trait every model backend implements.
///
/// `events` cannot fail: when the request cannot even be constructed, the
/// adapter returns a two-event stream of `RUN_STARTED` followed by
/// `RUN_ERROR`, so consumers handle exactly one shape.
///
/// # Object safety
///
/// `Adapter` is **not** object-safe because AFIT returns `impl Future`.
/// When you need dynamic dispatch, use [`DynAdapter`] — every `Adapter`
/// automatically implements it.
pub trait Adapter: Send + Sync {
    /// Starts a run and returns its event stream.
    fn events(&self, options: &ChatOptions) -> impl Future<Output = EventStream> + Send;

    /// Returns static metadata describing this adapter instance.
    fn metadata(&self) -> AdapterMetadata;
}

/// Object-safe counterpart of [`Adapter`] for dynamic dispatch.
///
/// You rarely implement this directly — the blanket
/// `impl<T: Adapter> DynAdapter for T` does it for you.
pub trait DynAdapter: Send + Sync {
    /// Boxed-future version of [`Adapter::events`].
    fn events_boxed<'a>(
        &'a self,
        options: &'a ChatOptions,
    ) -> Pin<Box<dyn Future<Output = EventStream> + Send + 'a>>;

    /// Returns static metadata describing this adapter instance.
    fn metadata(&self) -> AdapterMetadata;
}

impl<T: Adapter> DynAdapter for T {
    fn events_boxed<'a>(
        &'a self,
        options: &'a ChatOptions,
    ) -> Pin<Box<dyn Future<Output = EventStream> + Send + 'a>> {
        Box::pin(self.events(options))
    }

    fn metadata(&self) -> AdapterMetadata {
        Adapter::metadata(self)
    }
}

/// Describes an adapter instance: its name, model, and capabilities.
///
/// The `name` field uses [`Cow<'static, str>`] so that built-in adapters
/// can use `"anthropic"` (zero-alloc) while user-created adapters can use
/// owned strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    /// Backend name (e.g. `"anthropic"`, `"openai"`, `"ollama"`).
    pub name: Cow<'static, str>,
    /// The model identifier this adapter is bound to.
    pub model: String,
    /// Feature flags indicating what this backend supports.
    pub capabilities: HashSet<Capability>,
}

/// A feature that a backend may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Function/tool calling.
    Tools,
    /// JSON Schema–constrained output.
    StructuredOutput,
    /// Extended thinking/reasoning output (surfaced as step events).
    Thinking,
    /// Image understanding.
    Vision,
}

/// Parameters for a single model run.
///
/// Most fields are optional — at minimum you need
/// [`messages`](Self::messages). Use struct-update syntax for concise
/// construction:
///
/// ```rust
/// use runwire::{ChatOptions, Message};
///
/// let options = ChatOptions {
///     messages: vec![Message::user("Hello")],
///     max_tokens: Some(256),
///     temperature: Some(0.7),
///     ..Default::default()
/// };
/// ```
///
/// # Serialization
///
/// `ChatOptions` serializes for logging and request replay, except for
/// [`timeout`](Self::timeout) and [`cancellation`](Self::cancellation),
/// which are transport concerns and are `#[serde(skip)]`'d.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    /// The conversation history.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// System prompts, prepended in order before the message list (or
    /// passed through the provider's dedicated system channel).
    pub system_prompts: Vec<String>,
    /// Sampling temperature (0.0 = deterministic, higher = more random).
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// JSON Schema the final answer must conform to. Adapters pass it to
    /// the provider's native constrained-output mechanism where one
    /// exists; strict validation happens after the run.
    pub output_schema: Option<JsonSchema>,
    /// Arbitrary key-value pairs forwarded to the backend. Useful for
    /// provider features without a dedicated field.
    pub metadata: HashMap<String, Value>,
    /// Per-request timeout. Skipped during serialization.
    #[serde(skip)]
    pub timeout: Option<Duration>,
    /// Cooperative cancellation for this run. Skipped during
    /// serialization.
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl PartialEq for ChatOptions {
    // Transport fields compare by presence only; `CancellationToken` has
    // no equality.
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages
            && self.tools == other.tools
            && self.system_prompts == other.system_prompts
            && self.temperature == other.temperature
            && self.max_tokens == other.max_tokens
            && self.top_p == other.top_p
            && self.output_schema == other.output_schema
            && self.metadata == other.metadata
            && self.timeout == other.timeout
            && self.cancellation.is_some() == other.cancellation.is_some()
    }
}

impl ChatOptions {
    /// `true` once the run's cancellation token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// The result of folding a complete run, for callers that don't need
/// streaming.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    pub run_id: String,
    /// Concatenated assistant text.
    pub text: String,
    /// Completed tool calls, in start order, with fully accumulated
    /// argument strings.
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<UsageInfo>,
    pub model: Option<String>,
}

/// Folds an event stream into a [`RunSummary`].
///
/// This is the one-shot mode: the stream is the single source of truth and
/// this function merely accumulates it. A `RUN_ERROR` event maps back to
/// the matching [`AiError`]; a stream that ends without any terminal event
/// is a cancelled run.
pub async fn collect_run(mut events: EventStream) -> Result<RunSummary, AiError> {
    let mut summary = RunSummary::default();
    // Argument buffers keyed by call id, insertion-ordered.
    let mut calls: Vec<(String, String, String)> = Vec::new();
    let mut terminated = false;

    while let Some(event) = events.next().await {
        match event {
            RunEvent::RunStarted { run_id, model, .. } => {
                summary.run_id = run_id;
                summary.model = model;
            }
            RunEvent::TextMessageContent { delta, .. } => summary.text.push_str(&delta),
            RunEvent::ToolCallStart {
                tool_call_id,
                tool_name,
                ..
            } => calls.push((tool_call_id, tool_name, String::new())),
            RunEvent::ToolCallArgs {
                tool_call_id,
                delta,
                ..
            } => {
                if let Some((_, _, args)) = calls.iter_mut().find(|(id, _, _)| *id == tool_call_id)
                {
                    args.push_str(&delta);
                }
            }
            RunEvent::RunFinished {
                finish_reason,
                usage,
                ..
            } => {
                summary.finish_reason = finish_reason;
                summary.usage = usage;
                terminated = true;
            }
            RunEvent::RunError { error, .. } => {
                return Err(match error.code.as_deref() {
                    Some(code::MAX_TOKENS) => AiError::Truncated,
                    Some(code) => AiError::Provider {
                        code: code.to_owned(),
                        message: error.message,
                        retryable: false,
                    },
                    None => AiError::Provider {
                        code: "error".to_owned(),
                        message: error.message,
                        retryable: false,
                    },
                });
            }
            _ => {}
        }
    }

    if !terminated {
        return Err(AiError::Cancelled);
    }
    summary.tool_calls = calls
        .into_iter()
        .map(|(id, name, args)| ToolCall::new(id, name, args))
        .collect();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorInfo;

    fn stream_of(events: Vec<RunEvent>) -> EventStream {
        Box::pin(futures::stream::iter(events))
    }

    #[tokio::test]
    async fn test_collect_text_run() {
        let events = vec![
            RunEvent::run_started("run-1", Some("m".into())),
            RunEvent::text_message_start("msg-1", None),
            RunEvent::text_message_content("msg-1", None, "Hel", "Hel"),
            RunEvent::text_message_content("msg-1", None, "lo", "Hello"),
            RunEvent::text_message_end("msg-1", None),
            RunEvent::run_finished(
                "run-1",
                None,
                Some(FinishReason::Stop),
                Some(UsageInfo::new(3, 2)),
            ),
        ];
        let summary = collect_run(stream_of(events)).await.unwrap();
        assert_eq!(summary.run_id, "run-1");
        assert_eq!(summary.text, "Hello");
        assert_eq!(summary.finish_reason, Some(FinishReason::Stop));
        assert_eq!(summary.usage.unwrap().total_tokens, 5);
        assert!(summary.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_collect_interleaved_tool_calls() {
        let events = vec![
            RunEvent::run_started("run-1", None),
            RunEvent::tool_call_start("c1", "weather", None, Some(0)),
            RunEvent::tool_call_start("c2", "time", None, Some(1)),
            RunEvent::tool_call_args("c1", None, r#"{"city":"#, ""),
            RunEvent::tool_call_args("c2", None, r#"{}"#, ""),
            RunEvent::tool_call_args("c1", None, r#""Oslo"}"#, ""),
            RunEvent::tool_call_end("c2", "time", None, None),
            RunEvent::tool_call_end("c1", "weather", None, None),
            RunEvent::run_finished("run-1", None, Some(FinishReason::ToolCalls), None),
        ];
        let summary = collect_run(stream_of(events)).await.unwrap();
        assert_eq!(summary.tool_calls.len(), 2);
        assert_eq!(summary.tool_calls[0].id, "c1");
        assert_eq!(summary.tool_calls[0].arguments, r#"{"city":"Oslo"}"#);
        assert_eq!(summary.tool_calls[1].arguments, "{}");
        assert_eq!(summary.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_collect_maps_max_tokens_error() {
        let events = vec![
            RunEvent::run_started("run-1", None),
            RunEvent::run_error(
                Some("run-1".into()),
                None,
                ErrorInfo::with_code("maximum tokens reached", code::MAX_TOKENS),
            ),
        ];
        let err = collect_run(stream_of(events)).await.unwrap_err();
        assert!(matches!(err, AiError::Truncated));
    }

    #[tokio::test]
    async fn test_collect_unterminated_is_cancelled() {
        let events = vec![
            RunEvent::run_started("run-1", None),
            RunEvent::text_message_start("msg-1", None),
        ];
        let err = collect_run(stream_of(events)).await.unwrap_err();
        assert!(matches!(err, AiError::Cancelled));
    }

    #[test]
    fn test_chat_options_eq_ignores_token_identity() {
        let a = ChatOptions {
            messages: vec![Message::user("hi")],
            cancellation: Some(CancellationToken::new()),
            ..Default::default()
        };
        let mut b = a.clone();
        b.cancellation = Some(CancellationToken::new());
        assert_eq!(a, b);
        b.cancellation = None;
        assert_ne!(a, b);
    }
}
