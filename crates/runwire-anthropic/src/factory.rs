//! Factory for building Anthropic adapters from configuration.

use runwire::registry::{AdapterConfig, AdapterFactory};
use runwire::{AiError, DynAdapter};

use crate::{AnthropicAdapter, AnthropicConfig};

/// Factory for creating [`AnthropicAdapter`] instances from configuration.
///
/// Register it to enable config-driven adapter instantiation:
///
/// ```rust,no_run
/// use runwire::AdapterRegistry;
/// use runwire_anthropic::AnthropicFactory;
///
/// AdapterRegistry::global().register(Box::new(AnthropicFactory));
/// ```
///
/// # Configuration
///
/// | Field | Required | Description |
/// |-------|----------|-------------|
/// | `provider` | Yes | Must be `"anthropic"` |
/// | `api_key` | Yes | Anthropic API key |
/// | `model` | Yes | Model identifier |
/// | `base_url` | No | Custom API endpoint |
/// | `timeout` | No | Request timeout |
/// | `extra.max_tokens` | No | Default max tokens (default: 4096) |
/// | `extra.api_version` | No | API version header |
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicFactory;

impl AdapterFactory for AnthropicFactory {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn build(&self, config: &AdapterConfig) -> Result<Box<dyn DynAdapter>, AiError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AiError::InvalidRequest("anthropic adapter requires api_key".into()))?;

        if config.model.is_empty() {
            return Err(AiError::InvalidRequest(
                "anthropic adapter requires model".into(),
            ));
        }

        let mut anthropic_config = AnthropicConfig {
            api_key,
            model: config.model.clone(),
            ..Default::default()
        };

        if let Some(base_url) = &config.base_url {
            anthropic_config.base_url.clone_from(base_url);
        }
        if let Some(timeout) = config.timeout {
            anthropic_config.timeout = Some(timeout);
        }
        if let Some(max_tokens) = config.get_extra_u64("max_tokens") {
            anthropic_config.max_tokens =
                u32::try_from(max_tokens).unwrap_or(anthropic_config.max_tokens);
        }
        if let Some(api_version) = config.get_extra_str("api_version") {
            anthropic_config.api_version = api_version.to_string();
        }

        Ok(Box::new(AnthropicAdapter::new(anthropic_config)))
    }
}

/// Registers the Anthropic factory with the global registry.
pub fn register_global() {
    runwire::AdapterRegistry::global().register(Box::new(AnthropicFactory));
}
