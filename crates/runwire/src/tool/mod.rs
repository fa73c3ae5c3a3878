//! Tool definition, registration, and execution.
//!
//! A tool comes in two flavors:
//!
//! - **Server tool** — a [`ToolDefinition`] plus a [`ToolHandler`]; the
//!   agent loop executes it automatically and feeds the result back to the
//!   model.
//! - **Client tool** — a definition registered *without* a handler. The
//!   loop surfaces the call to the application (a `CUSTOM`
//!   `tool-input-available` event) and waits for the result to come back.
//!
//! Definitions with `needs_approval` are gated: the loop asks for an
//! explicit decision before executing, and a declined call becomes a
//! tool-error result the model can see.

mod error;
mod execution;
mod handler;
mod registry;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub use error::ToolError;
pub use execution::{ExecutionOutcome, execute_tool_calls};
pub use handler::{FnToolHandler, ToolHandler, tool_fn};
pub use registry::ToolRegistry;

use crate::event::RunEvent;
use crate::schema::JsonSchema;

/// A tool the model can invoke during generation.
///
/// Adapters translate this into their backend's native tool format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool's name, used to match
    /// [`ToolCall::name`](crate::ToolCall::name). Unique per registry.
    pub name: String,
    /// Human-readable description shown to the model so it knows when to
    /// use this tool.
    pub description: String,
    /// JSON Schema describing the tool's expected input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonSchema>,
    /// JSON Schema the tool's output must conform to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonSchema>,
    /// Execution requires an explicit approval decision first.
    #[serde(default)]
    pub needs_approval: bool,
    /// Adapter- or application-specific extras.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
            output_schema: None,
            needs_approval: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_input_schema(mut self, schema: JsonSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: JsonSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.needs_approval = true;
        self
    }
}

/// Execution context handed to every tool handler.
///
/// Carries an emitter for `CUSTOM` events: anything a tool emits here is
/// forwarded verbatim into the run's event stream, outside the lifecycle
/// vocabulary.
#[derive(Debug, Clone, Default)]
pub struct ToolCtx {
    emitter: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl ToolCtx {
    /// A context whose custom events are forwarded through `sender`.
    pub fn with_emitter(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            emitter: Some(sender),
        }
    }

    /// Emits a `CUSTOM` event into the run's stream. A no-op when no
    /// emitter is attached (e.g. direct registry use in tests).
    pub fn emit_custom(&self, name: impl Into<String>, data: Option<Value>) {
        if let Some(emitter) = &self.emitter {
            let _ = emitter.send(RunEvent::custom(name, data));
        }
    }
}
