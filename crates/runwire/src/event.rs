//! Run event types.
//!
//! Every adapter, and the agent loop built on top of them, speaks the same
//! event vocabulary: a run begins with [`RunStarted`](RunEvent::RunStarted),
//! streams text and tool-call fragments, and ends with exactly one terminal
//! event — [`RunFinished`](RunEvent::RunFinished) on success or
//! [`RunError`](RunEvent::RunError) on failure. The JSON shape follows the
//! AG-UI protocol: a `type` tag in SCREAMING_SNAKE_CASE and camelCase fields,
//! so a serialized stream can be fed directly to AG-UI consumers.
//!
//! # Consuming a stream
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use runwire::{EventStream, RunEvent};
//!
//! async fn print_run(mut events: EventStream) {
//!     while let Some(event) = events.next().await {
//!         match event {
//!             RunEvent::TextMessageContent { delta, .. } => print!("{delta}"),
//!             RunEvent::RunFinished { finish_reason, .. } => {
//!                 println!("\n[done: {finish_reason:?}]");
//!             }
//!             RunEvent::RunError { error, .. } => eprintln!("run error: {}", error.message),
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! # Tool-call reassembly
//!
//! Tool calls arrive in three phases keyed by `tool_call_id`:
//! 1. [`ToolCallStart`](RunEvent::ToolCallStart) — announces id and name.
//! 2. [`ToolCallArgs`](RunEvent::ToolCallArgs) — JSON argument fragments; the
//!    optional `args` field carries the accumulated string so far.
//! 3. [`ToolCallEnd`](RunEvent::ToolCallEnd) — the call is complete and its
//!    accumulated arguments parse as a full JSON document.
//!
//! Calls may interleave; consumers must demultiplex by `tool_call_id`.

use std::ops::AddAssign;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::Stream;
use serde::{Deserialize, Serialize};

/// A pinned, boxed, `Send` stream of [`RunEvent`]s.
///
/// Errors travel in-band as [`RunError`](RunEvent::RunError) events, so the
/// item type is a plain event. A stream that ends without a terminal event
/// was cancelled mid-run.
pub type EventStream = Pin<Box<dyn Stream<Item = RunEvent> + Send>>;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of turn.
    Stop,
    /// Output hit the token limit. Adapters surface this as a
    /// [`RunError`](RunEvent::RunError) rather than a finish; the variant
    /// exists for wire compatibility when deserializing foreign streams.
    Length,
    /// The provider filtered the output.
    ContentFilter,
    /// The model stopped to invoke tools.
    ToolCalls,
}

/// Token usage counters, additive across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl UsageInfo {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulates `other` into `self` when present.
    pub fn add_optional(&mut self, other: Option<&UsageInfo>) {
        if let Some(other) = other {
            *self += other;
        }
    }
}

impl AddAssign<&UsageInfo> for UsageInfo {
    fn add_assign(&mut self, other: &UsageInfo) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Error payload carried by [`RunError`](RunEvent::RunError).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

/// A single event in a run's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
#[non_exhaustive]
pub enum RunEvent {
    /// First event of every run.
    RunStarted {
        run_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
    /// Successful terminal event.
    RunFinished {
        run_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<UsageInfo>,
    },
    /// Failed terminal event. `run_id` is absent only when the failure
    /// happened before a run could be identified.
    RunError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        error: ErrorInfo,
    },
    /// An assistant text message has started.
    TextMessageStart {
        message_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        role: String,
    },
    /// A fragment of assistant text. `content` carries the cumulative text
    /// including this delta.
    TextMessageContent {
        message_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// The text message is complete.
    TextMessageEnd {
        message_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// A tool call has started.
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Provider-side positional index when several calls stream in
        /// parallel.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
    },
    /// A fragment of a tool call's JSON arguments. `args` carries the
    /// cumulative argument string including this delta.
    ToolCallArgs {
        tool_call_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
    },
    /// The tool call's arguments are complete.
    ToolCallEnd {
        tool_call_id: String,
        tool_name: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Parsed arguments, when the accumulated string was valid JSON.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
        /// Serialized execution result, present only on replayed streams.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    /// A reasoning/thinking step has started.
    StepStarted {
        step_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_type: Option<String>,
    },
    /// A reasoning/thinking step has finished.
    StepFinished {
        step_id: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// Full shared-state snapshot.
    StateSnapshot {
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        state: serde_json::Value,
    },
    /// Incremental shared-state update.
    StateDelta {
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        delta: serde_json::Value,
    },
    /// Extension point for events outside the core vocabulary. The agent
    /// loop uses it for approval requests and client-tool handoffs, and
    /// forwards tool-emitted custom events verbatim.
    Custom {
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
}

impl RunEvent {
    /// Whether this event terminates its run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::RunFinished { .. } | RunEvent::RunError { .. }
        )
    }

    pub fn run_started(run_id: impl Into<String>, model: Option<String>) -> Self {
        RunEvent::RunStarted {
            run_id: run_id.into(),
            timestamp: now_ms(),
            model,
            thread_id: None,
        }
    }

    pub fn run_finished(
        run_id: impl Into<String>,
        model: Option<String>,
        finish_reason: Option<FinishReason>,
        usage: Option<UsageInfo>,
    ) -> Self {
        RunEvent::RunFinished {
            run_id: run_id.into(),
            timestamp: now_ms(),
            model,
            finish_reason,
            usage,
        }
    }

    pub fn run_error(run_id: Option<String>, model: Option<String>, error: ErrorInfo) -> Self {
        RunEvent::RunError {
            run_id,
            timestamp: now_ms(),
            model,
            error,
        }
    }

    pub fn text_message_start(message_id: impl Into<String>, model: Option<String>) -> Self {
        RunEvent::TextMessageStart {
            message_id: message_id.into(),
            timestamp: now_ms(),
            model,
            role: "assistant".to_owned(),
        }
    }

    pub fn text_message_content(
        message_id: impl Into<String>,
        model: Option<String>,
        delta: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        RunEvent::TextMessageContent {
            message_id: message_id.into(),
            timestamp: now_ms(),
            model,
            delta: delta.into(),
            content: Some(content.into()),
        }
    }

    pub fn text_message_end(message_id: impl Into<String>, model: Option<String>) -> Self {
        RunEvent::TextMessageEnd {
            message_id: message_id.into(),
            timestamp: now_ms(),
            model,
        }
    }

    pub fn tool_call_start(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        model: Option<String>,
        index: Option<u32>,
    ) -> Self {
        RunEvent::ToolCallStart {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            timestamp: now_ms(),
            model,
            index,
        }
    }

    pub fn tool_call_args(
        tool_call_id: impl Into<String>,
        model: Option<String>,
        delta: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        RunEvent::ToolCallArgs {
            tool_call_id: tool_call_id.into(),
            timestamp: now_ms(),
            model,
            delta: delta.into(),
            args: Some(args.into()),
        }
    }

    pub fn tool_call_end(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        model: Option<String>,
        input: Option<serde_json::Value>,
    ) -> Self {
        RunEvent::ToolCallEnd {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            timestamp: now_ms(),
            model,
            input,
            result: None,
        }
    }

    pub fn custom(name: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        RunEvent::Custom {
            timestamp: now_ms(),
            model: None,
            name: name.into(),
            data,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `run-` prefixed v4 UUID.
pub fn new_run_id() -> String {
    format!("run-{}", uuid::Uuid::new_v4())
}

/// `msg-` prefixed v4 UUID.
pub fn new_message_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4())
}

/// `call-` prefixed v4 UUID.
pub fn new_call_id() -> String {
    format!("call-{}", uuid::Uuid::new_v4())
}

/// `step-` prefixed v4 UUID.
pub fn new_step_id() -> String {
    format!("step-{}", uuid::Uuid::new_v4())
}
