//! Structured output — typed model responses with schema validation.
//!
//! [`generate_object`] combines schema derivation, generation, strict
//! validation, and deserialization into one call:
//!
//! ```rust,no_run
//! use runwire::structured::{GenerateObjectConfig, generate_object};
//! use runwire::{ChatOptions, Message};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, schemars::JsonSchema)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! # async fn example(adapter: &dyn runwire::DynAdapter) -> Result<(), runwire::AiError> {
//! let options = ChatOptions {
//!     messages: vec![Message::user("Generate a person named Alice aged 30")],
//!     ..Default::default()
//! };
//! let result =
//!     generate_object::<Person>(adapter, options, GenerateObjectConfig::default()).await?;
//! assert_eq!(result.value.name, "Alice");
//! # Ok(())
//! # }
//! ```
//!
//! Validation here is *strict*: the full response text must parse as JSON
//! and satisfy the schema. The tolerant parser in
//! [`partial_json`](crate::partial_json) is for mid-stream previews only.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::adapter::{ChatOptions, DynAdapter, collect_run};
use crate::error::AiError;
use crate::event::UsageInfo;
use crate::message::Message;
use crate::schema::JsonSchema;

/// Configuration for [`generate_object`].
#[derive(Debug, Clone)]
pub struct GenerateObjectConfig {
    /// Maximum number of attempts (initial + retries). Default: 1.
    /// On retry, the invalid response and the validation error are
    /// appended to the conversation so the model can self-correct.
    pub max_attempts: u32,
}

impl Default for GenerateObjectConfig {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

/// The result of a successful [`generate_object`] call.
#[derive(Debug)]
pub struct GenerateObjectResult<T> {
    /// The deserialized, validated object.
    pub value: T,
    /// The raw JSON string returned by the model.
    pub raw_json: String,
    /// Accumulated usage across all attempts.
    pub usage: Option<UsageInfo>,
    /// How many attempts were made (1 = succeeded on first try).
    pub attempts: u32,
}

/// Strictly parses `text` as JSON and validates it against `schema`.
///
/// Both failure modes come back as [`AiError::SchemaValidation`]; the
/// agent loop surfaces that as a `schema_mismatch` run error.
pub fn validate_structured_text(text: &str, schema: &JsonSchema) -> Result<Value, AiError> {
    let value: Value = serde_json::from_str(text).map_err(|err| AiError::SchemaValidation {
        message: format!("response is not valid JSON: {err}"),
        schema: schema.as_value().clone(),
        actual: Value::String(text.to_owned()),
    })?;
    schema.validate(&value)?;
    Ok(value)
}

/// Generates a typed object with schema validation.
///
/// 1. Derives a JSON Schema from `T` (via [`schemars`])
/// 2. Sets `output_schema` on the options
/// 3. Streams the run and folds it
/// 4. Strictly parses, validates, and deserializes the response text
///
/// # Errors
///
/// Adapter failures propagate immediately; validation failures are
/// retried up to `config.max_attempts` and the last
/// [`AiError::SchemaValidation`] is returned when all attempts fail.
pub async fn generate_object<T>(
    adapter: &dyn DynAdapter,
    mut options: ChatOptions,
    config: GenerateObjectConfig,
) -> Result<GenerateObjectResult<T>, AiError>
where
    T: DeserializeOwned + schemars::JsonSchema,
{
    if config.max_attempts == 0 {
        return Err(AiError::InvalidRequest("max_attempts must be at least 1".into()));
    }
    let schema = JsonSchema::from_type::<T>()
        .map_err(|e| AiError::InvalidRequest(format!("failed to derive JSON schema: {e}")))?;
    options.output_schema = Some(schema.clone());

    let mut total_usage = UsageInfo::default();
    let mut saw_usage = false;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        let summary = collect_run(adapter.events_boxed(&options).await).await?;
        if let Some(usage) = &summary.usage {
            total_usage += usage;
            saw_usage = true;
        }
        match validate_structured_text(&summary.text, &schema) {
            Ok(value) => {
                let value: T = serde_json::from_value(value)?;
                return Ok(GenerateObjectResult {
                    value,
                    raw_json: summary.text,
                    usage: saw_usage.then_some(total_usage),
                    attempts: attempt,
                });
            }
            Err(err) => {
                if attempt < config.max_attempts {
                    options.messages.push(Message::assistant(summary.text));
                    options.messages.push(Message::user(format!(
                        "The previous response was invalid: {err}. \
                         Respond again with JSON matching the schema exactly."
                    )));
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or(AiError::InvalidRequest("no attempts made".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use crate::test_helpers::{error_run, text_run};

    #[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
    struct Person {
        name: String,
        age: u32,
    }

    #[tokio::test]
    async fn test_generate_object_success() {
        let mock = MockAdapter::new();
        mock.queue_run(text_run("run-1", r#"{"name": "Alice", "age": 30}"#));
        let result = generate_object::<Person>(
            &mock,
            ChatOptions::default(),
            GenerateObjectConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.value.name, "Alice");
        assert_eq!(result.value.age, 30);
        assert_eq!(result.attempts, 1);
        // The adapter was asked for constrained output.
        let calls = mock.recorded_calls();
        assert!(calls[0].output_schema.is_some());
    }

    #[tokio::test]
    async fn test_generate_object_retries_then_succeeds() {
        let mock = MockAdapter::new();
        mock.queue_run(text_run("run-1", "not json at all"));
        mock.queue_run(text_run("run-2", r#"{"name": "Bob", "age": 44}"#));
        let result = generate_object::<Person>(
            &mock,
            ChatOptions::default(),
            GenerateObjectConfig { max_attempts: 2 },
        )
        .await
        .unwrap();
        assert_eq!(result.attempts, 2);
        // The retry carried the invalid response back to the model.
        let calls = mock.recorded_calls();
        assert_eq!(calls[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_object_validation_failure() {
        let mock = MockAdapter::new();
        mock.queue_run(text_run("run-1", r#"{"name": "Alice", "age": "old"}"#));
        let err = generate_object::<Person>(
            &mock,
            ChatOptions::default(),
            GenerateObjectConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AiError::SchemaValidation { .. }));
    }

    #[tokio::test]
    async fn test_adapter_errors_propagate_unretried() {
        let mock = MockAdapter::new();
        mock.queue_run(error_run("run-1", "overloaded", "try later"));
        let err = generate_object::<Person>(
            &mock,
            ChatOptions::default(),
            GenerateObjectConfig { max_attempts: 3 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AiError::Provider { .. }));
        assert_eq!(mock.recorded_calls().len(), 1);
    }

    #[test]
    fn test_validate_structured_text_strict() {
        let schema = JsonSchema::new(serde_json::json!({
            "type": "object",
            "required": ["name"]
        }));
        assert!(validate_structured_text(r#"{"name": "x"}"#, &schema).is_ok());
        // Truncated JSON that the tolerant parser would accept fails here.
        assert!(validate_structured_text(r#"{"name": "x"#, &schema).is_err());
        assert!(validate_structured_text(r#"{}"#, &schema).is_err());
    }
}
