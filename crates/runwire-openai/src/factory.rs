//! Factory for building `OpenAI` adapters from configuration.

use runwire::registry::{AdapterConfig, AdapterFactory};
use runwire::{AiError, DynAdapter};

use crate::{OpenAiAdapter, OpenAiConfig};

/// Factory for creating [`OpenAiAdapter`] instances from configuration.
///
/// Register it to enable config-driven adapter instantiation:
///
/// ```rust,no_run
/// use runwire::AdapterRegistry;
/// use runwire_openai::OpenAiFactory;
///
/// AdapterRegistry::global().register(Box::new(OpenAiFactory));
/// ```
///
/// # Configuration
///
/// | Field | Required | Description |
/// |-------|----------|-------------|
/// | `provider` | Yes | Must be `"openai"` |
/// | `api_key` | Yes | `OpenAI` API key |
/// | `model` | Yes | Model identifier (e.g. `"gpt-4o"`) |
/// | `base_url` | No | Custom API endpoint |
/// | `timeout` | No | Request timeout |
/// | `extra.organization` | No | `OpenAI` organization ID |
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiFactory;

impl AdapterFactory for OpenAiFactory {
    fn name(&self) -> &str {
        "openai"
    }

    fn build(&self, config: &AdapterConfig) -> Result<Box<dyn DynAdapter>, AiError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AiError::InvalidRequest("openai adapter requires api_key".into()))?;

        if config.model.is_empty() {
            return Err(AiError::InvalidRequest(
                "openai adapter requires model".into(),
            ));
        }

        let mut openai_config = OpenAiConfig {
            api_key,
            model: config.model.clone(),
            ..Default::default()
        };

        if let Some(base_url) = &config.base_url {
            openai_config.base_url.clone_from(base_url);
        }
        if let Some(timeout) = config.timeout {
            openai_config.timeout = Some(timeout);
        }
        if let Some(organization) = config.get_extra_str("organization") {
            openai_config.organization = Some(organization.to_string());
        }

        Ok(Box::new(OpenAiAdapter::new(openai_config)))
    }
}

/// Registers the `OpenAI` factory with the global registry.
pub fn register_global() {
    runwire::AdapterRegistry::global().register(Box::new(OpenAiFactory));
}
