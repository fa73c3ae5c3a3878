//! Adapter registry for configuration-driven backend selection.
//!
//! Backend choice is an explicit, closed set: a configuration names its
//! adapter (`"anthropic"`, `"openai"`, `"ollama"`, or something an
//! application registered itself) and the registry builds it. There is no
//! inference from model-name patterns — an unknown tag is an error, not a
//! guess.
//!
//! # Example
//!
//! ```rust,no_run
//! use runwire::registry::{AdapterConfig, AdapterRegistry};
//!
//! // Get the global registry (adapter crates register themselves on
//! // startup).
//! let registry = AdapterRegistry::global();
//!
//! let config = AdapterConfig::new("anthropic", "claude-sonnet-4-20250514")
//!     .api_key("sk-...");
//! let adapter = registry.build(&config).expect("adapter registered");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use crate::adapter::DynAdapter;
use crate::error::AiError;

/// Configuration for building an adapter from the registry.
///
/// Common fields cover every built-in backend; adapter-specific options go
/// in the `extra` map, keyed as each adapter documents.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    /// Adapter tag (e.g. `"anthropic"`, `"openai"`, `"ollama"`).
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// API key for authenticated backends.
    pub api_key: Option<String>,
    /// Custom base URL for the API endpoint.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Adapter-specific configuration options.
    pub extra: HashMap<String, serde_json::Value>,
}

impl AdapterConfig {
    /// Creates a new config with the given adapter tag and model.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Gets a string value from extra options.
    pub fn get_extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    /// Gets a bool value from extra options.
    pub fn get_extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Gets an unsigned integer value from extra options.
    pub fn get_extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// Factory trait for creating adapters from configuration.
pub trait AdapterFactory: Send + Sync {
    /// The adapter tag used for registration and lookup. Lowercase.
    fn name(&self) -> &str;

    /// Creates an adapter instance from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or missing
    /// required fields for this backend.
    fn build(&self, config: &AdapterConfig) -> Result<Box<dyn DynAdapter>, AiError>;
}

/// A registry of adapter factories.
///
/// Thread-safe; registration and lookup use interior mutability via
/// `RwLock`. Use [`AdapterRegistry::global()`] for the shared global
/// registry, or [`AdapterRegistry::new()`] for an isolated one in tests.
pub struct AdapterRegistry {
    factories: RwLock<HashMap<String, Arc<dyn AdapterFactory>>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let factories = self.factories.read().expect("adapter registry lock poisoned");
        let names: Vec<_> = factories.keys().collect();
        f.debug_struct("AdapterRegistry")
            .field("adapters", &names)
            .finish()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the global shared registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<AdapterRegistry> = OnceLock::new();
        GLOBAL.get_or_init(AdapterRegistry::new)
    }

    /// Registers an adapter factory. A factory with the same name is
    /// replaced.
    pub fn register(&self, factory: Box<dyn AdapterFactory>) -> &Self {
        let name = factory.name().to_lowercase();
        let mut factories = self.factories.write().expect("adapter registry lock poisoned");
        factories.insert(name, Arc::from(factory));
        self
    }

    /// Unregisters an adapter by tag. Returns `true` if one was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut factories = self.factories.write().expect("adapter registry lock poisoned");
        factories.remove(&name.to_lowercase()).is_some()
    }

    /// Whether an adapter tag is registered.
    pub fn contains(&self, name: &str) -> bool {
        let factories = self.factories.read().expect("adapter registry lock poisoned");
        factories.contains_key(&name.to_lowercase())
    }

    /// The tags of all registered adapters.
    pub fn adapters(&self) -> Vec<String> {
        let factories = self.factories.read().expect("adapter registry lock poisoned");
        factories.keys().cloned().collect()
    }

    /// Builds an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::InvalidRequest`] if no factory is registered
    /// under `config.provider`.
    pub fn build(&self, config: &AdapterConfig) -> Result<Box<dyn DynAdapter>, AiError> {
        let name = config.provider.to_lowercase();
        let factories = self.factories.read().expect("adapter registry lock poisoned");
        let factory = factories.get(&name).ok_or_else(|| {
            let mut available: Vec<_> = factories.keys().cloned().collect();
            available.sort();
            AiError::InvalidRequest(format!(
                "unknown adapter '{}'. Available: {available:?}",
                config.provider
            ))
        })?;
        factory.build(config)
    }
}
