//! Tool handler trait and implementations.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{ToolCtx, ToolDefinition, ToolError};

/// A single tool the agent loop can execute.
///
/// Implement this trait for tools that need state or lifetime management.
/// For simple tools, use [`tool_fn`] to wrap a closure.
///
/// The trait is object-safe (uses boxed futures) so handlers can be
/// stored as `Arc<dyn ToolHandler>`.
///
/// # Example
///
/// ```rust
/// use runwire::tool::{ToolCtx, ToolDefinition, ToolError, ToolHandler};
/// use serde_json::{Value, json};
/// use std::future::Future;
/// use std::pin::Pin;
///
/// struct ClockTool;
///
/// impl ToolHandler for ClockTool {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition::new("clock", "Current Unix time in seconds")
///     }
///
///     fn execute<'a>(
///         &'a self,
///         _input: Value,
///         _ctx: &'a ToolCtx,
///     ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
///         Box::pin(async move { Ok(json!({"epoch": 1_700_000_000})) })
///     }
/// }
/// ```
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's definition (name, description, schemas).
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with parsed JSON arguments.
    ///
    /// The returned value is serialized into the tool-role message fed
    /// back to the model, and validated against the definition's
    /// `output_schema` when one is present.
    fn execute<'a>(
        &'a self,
        input: Value,
        ctx: &'a ToolCtx,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;
}

/// A tool handler backed by an async closure, created via [`tool_fn`].
pub struct FnToolHandler<F> {
    definition: ToolDefinition,
    handler: F,
}

impl<F> std::fmt::Debug for FnToolHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnToolHandler")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn execute<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ToolCtx,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        Box::pin((self.handler)(input))
    }
}

/// Wraps an async closure as a [`ToolHandler`].
///
/// ```rust
/// use runwire::tool::{ToolDefinition, tool_fn};
/// use serde_json::json;
///
/// let echo = tool_fn(
///     ToolDefinition::new("echo", "Echoes its input"),
///     |input| async move { Ok(json!({"echoed": input})) },
/// );
/// ```
pub fn tool_fn<F, Fut>(definition: ToolDefinition, handler: F) -> FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    FnToolHandler {
        definition,
        handler,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_tool_fn_executes() {
        let double = tool_fn(
            ToolDefinition::new("double", "Doubles a number"),
            |input| async move {
                let n = input["n"].as_i64().ok_or_else(|| ToolError::new("missing n"))?;
                Ok(json!({"result": n * 2}))
            },
        );
        let ctx = ToolCtx::default();
        let out = double.execute(json!({"n": 21}), &ctx).await.unwrap();
        assert_eq!(out, json!({"result": 42}));
        assert_eq!(double.definition().name, "double");
    }

    #[tokio::test]
    async fn test_tool_fn_propagates_errors() {
        let failing = tool_fn(
            ToolDefinition::new("failing", "Always fails"),
            |_| async move { Err::<Value, _>(ToolError::new("unavailable")) },
        );
        let ctx = ToolCtx::default();
        let err = failing.execute(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.message, "unavailable");
    }
}
