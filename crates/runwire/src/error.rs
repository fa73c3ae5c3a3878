//! Unified error type for all model operations.
//!
//! Every adapter maps its native failures into [`AiError`], giving callers a
//! single type to match against regardless of which backend is in use.
//! Inside an event stream, errors travel as `RUN_ERROR` events; [`AiError`]
//! is the edge representation used by [`collect_run`](crate::collect_run),
//! tool execution, and structured output.
//!
//! # Retryability
//!
//! HTTP and provider variants carry a `retryable` flag that adapters set
//! from the upstream response (e.g. HTTP 429 or 503):
//!
//! ```rust
//! use runwire::AiError;
//!
//! fn should_retry(err: &AiError) -> bool {
//!     err.is_retryable()
//! }
//! ```

use serde_json::Value;

/// Well-known `RUN_ERROR` codes emitted by adapters and the agent loop.
pub mod code {
    /// Output was truncated by the provider's token limit.
    pub const MAX_TOKENS: &str = "max_tokens";
    /// The agent loop hit its iteration cap while the model still wanted
    /// tools.
    pub const ITERATION_LIMIT: &str = "iteration_limit";
    /// Structured output failed strict parsing or schema validation.
    pub const SCHEMA_MISMATCH: &str = "schema_mismatch";
    /// The provider stream carried a malformed frame.
    pub const STREAM_FORMAT: &str = "stream_format";
    /// The HTTP request failed before or during streaming.
    pub const HTTP: &str = "http";
}

/// The unified error type returned at the edges of a run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AiError {
    /// An HTTP-level failure (transport error, unexpected status code).
    ///
    /// `status` is `None` when the request never received a response.
    #[error("HTTP error (status={status:?}): {message}")]
    Http {
        status: Option<http::StatusCode>,
        message: String,
        /// Whether the caller should retry this request.
        retryable: bool,
    },

    /// The API key or token was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The request was malformed (missing fields, invalid parameters).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A provider-reported error, including in-stream error frames.
    #[error("Provider error ({code}): {message}")]
    Provider {
        /// Provider-defined or well-known [`code`] string.
        code: String,
        message: String,
        retryable: bool,
    },

    /// The response body or a stream frame could not be parsed.
    #[error("Response format error: {message}")]
    ResponseFormat {
        message: String,
        /// The raw payload, for diagnostics.
        raw: String,
    },

    /// Output was truncated at the provider's token limit.
    ///
    /// Truncated output is treated as a failure, never as a finished run:
    /// a truncated answer or a half-emitted tool call is not a result the
    /// caller can act on.
    #[error("Output truncated at max_tokens")]
    Truncated,

    /// A structured-output response failed strict parsing or JSON Schema
    /// validation.
    #[error("Schema validation error: {message}")]
    SchemaValidation {
        message: String,
        schema: Value,
        actual: Value,
    },

    /// A tool invocation raised an error.
    #[error("Tool execution error ({tool_name}): {message}")]
    ToolExecution { tool_name: String, message: String },

    /// The agent loop reached its iteration cap while the model was still
    /// requesting tools.
    #[error("Agent loop stopped after {iterations} iterations with tool calls outstanding")]
    IterationLimit { iterations: u32 },

    /// The run was cancelled before reaching a terminal event.
    #[error("Run cancelled")]
    Cancelled,

    /// The operation exceeded its deadline.
    #[error("Operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl AiError {
    /// `true` if the error is transient and the request may succeed on
    /// retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } | Self::Provider { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// The `RUN_ERROR` representation of this error.
    pub fn to_error_info(&self) -> crate::event::ErrorInfo {
        let code = match self {
            Self::Http { .. } | Self::Auth(_) | Self::InvalidRequest(_) => code::HTTP,
            Self::Provider { code, .. } => code,
            Self::ResponseFormat { .. } => code::STREAM_FORMAT,
            Self::Truncated => code::MAX_TOKENS,
            Self::SchemaValidation { .. } => code::SCHEMA_MISMATCH,
            Self::IterationLimit { .. } => code::ITERATION_LIMIT,
            _ => {
                return crate::event::ErrorInfo::new(self.to_string());
            }
        };
        crate::event::ErrorInfo::with_code(self.to_string(), code)
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseFormat {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}
