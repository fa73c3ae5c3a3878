//! Tool registry: named handlers plus client-tool definitions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{ToolCtx, ToolDefinition, ToolHandler};
use crate::message::{ToolCall, ToolCallResult};

/// A registry of tools, indexed by name.
///
/// Server tools carry a handler and execute in-process; client tools are
/// definitions only and round-trip through the application. Registering a
/// name twice replaces the earlier entry, so names stay unique.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    client_tools: HashMap<String, ToolDefinition>,
}

impl Clone for ToolRegistry {
    /// Cheap clone — `Arc` pointers to handlers, not the handlers
    /// themselves.
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            client_tools: self.client_tools.clone(),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.handlers.keys().collect::<Vec<_>>())
            .field("client_tools", &self.client_tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server tool.
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> &mut Self {
        self.register_shared(Arc::new(handler))
    }

    /// Registers a shared server tool handler.
    pub fn register_shared(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = handler.definition().name.clone();
        self.client_tools.remove(&name);
        self.handlers.insert(name, handler);
        self
    }

    /// Registers a client tool: the definition is advertised to the
    /// model, but execution happens outside the loop.
    pub fn register_client(&mut self, definition: ToolDefinition) -> &mut Self {
        self.handlers.remove(&definition.name);
        self.client_tools.insert(definition.name.clone(), definition);
        self
    }

    /// Returns the handler for the given tool name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    /// Whether a tool with the given name is registered (either flavor).
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name) || self.client_tools.contains_key(name)
    }

    /// Whether `name` is a client tool.
    pub fn is_client(&self, name: &str) -> bool {
        self.client_tools.contains_key(name)
    }

    /// Whether `name` requires an approval decision before execution.
    pub fn needs_approval(&self, name: &str) -> bool {
        self.definition(name).is_some_and(|d| d.needs_approval)
    }

    /// The definition registered under `name`, either flavor.
    pub fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.handlers
            .get(name)
            .map(|h| h.definition())
            .or_else(|| self.client_tools.get(name).cloned())
    }

    /// The definitions of all registered tools, for
    /// [`ChatOptions::tools`](crate::ChatOptions::tools). Sorted by name
    /// for a stable request shape.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .handlers
            .values()
            .map(|h| h.definition())
            .chain(self.client_tools.values().cloned())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Whether any registered tool is present.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.client_tools.is_empty()
    }

    /// Executes one call end to end: strict argument parse, input-schema
    /// validation, handler, output-schema validation.
    ///
    /// Every failure mode becomes an error *result* — unknown tool,
    /// malformed arguments, schema mismatch, handler error — so the model
    /// always gets an answer for the call and the run continues.
    pub async fn execute_call(&self, call: &ToolCall, ctx: &ToolCtx) -> ToolCallResult {
        let Some(handler) = self.handlers.get(&call.name) else {
            return ToolCallResult::error(
                &call.id,
                &call.name,
                format!("unknown tool: {}", call.name),
            );
        };
        let input = match call.parsed_arguments() {
            Ok(input) => input,
            Err(err) => {
                return ToolCallResult::error(
                    &call.id,
                    &call.name,
                    format!("invalid tool arguments: {err}"),
                );
            }
        };
        let definition = handler.definition();
        #[cfg(feature = "schema")]
        if let Some(schema) = &definition.input_schema {
            if let Err(err) = schema.validate(&input) {
                return ToolCallResult::error(
                    &call.id,
                    &call.name,
                    format!("input validation failed: {err}"),
                );
            }
        }
        let output = match handler.execute(input, ctx).await {
            Ok(output) => output,
            Err(err) => return ToolCallResult::error(&call.id, &call.name, err.message),
        };
        #[cfg(feature = "schema")]
        if let Some(schema) = &definition.output_schema {
            if let Err(err) = schema.validate(&output) {
                return ToolCallResult::error(
                    &call.id,
                    &call.name,
                    format!("output validation failed: {err}"),
                );
            }
        }
        ToolCallResult::ok(&call.id, &call.name, serialize_output(&output))
    }
}

fn serialize_output(output: &Value) -> String {
    // A bare string goes through as-is; everything else serializes.
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
