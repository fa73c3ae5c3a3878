//! Factory for building Ollama adapters from configuration.

use runwire::registry::{AdapterConfig, AdapterFactory};
use runwire::{AiError, DynAdapter};

use crate::{OllamaAdapter, OllamaConfig};

/// Factory for creating [`OllamaAdapter`] instances from configuration.
///
/// Register it to enable config-driven adapter instantiation:
///
/// ```rust,no_run
/// use runwire::AdapterRegistry;
/// use runwire_ollama::OllamaFactory;
///
/// AdapterRegistry::global().register(Box::new(OllamaFactory));
/// ```
///
/// # Configuration
///
/// | Field | Required | Description |
/// |-------|----------|-------------|
/// | `provider` | Yes | Must be `"ollama"` |
/// | `model` | Yes | Model identifier (e.g. `"llama3.2"`) |
/// | `base_url` | No | Server URL (default `http://localhost:11434`) |
/// | `timeout` | No | Request timeout |
///
/// No `api_key` is required; Ollama has no authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaFactory;

impl AdapterFactory for OllamaFactory {
    fn name(&self) -> &str {
        "ollama"
    }

    fn build(&self, config: &AdapterConfig) -> Result<Box<dyn DynAdapter>, AiError> {
        if config.model.is_empty() {
            return Err(AiError::InvalidRequest(
                "ollama adapter requires model".into(),
            ));
        }

        let mut ollama_config = OllamaConfig {
            model: config.model.clone(),
            ..Default::default()
        };

        if let Some(base_url) = &config.base_url {
            ollama_config.base_url.clone_from(base_url);
        }
        if let Some(timeout) = config.timeout {
            ollama_config.timeout = Some(timeout);
        }

        Ok(Box::new(OllamaAdapter::new(ollama_config)))
    }
}

/// Registers the Ollama factory with the global registry.
pub fn register_global() {
    runwire::AdapterRegistry::global().register(Box::new(OllamaFactory));
}
