//! Provider lookup by configured type.
//!
//! The runtime config names its provider by `type`. The registry maps that
//! name to a factory that builds the client from the provider section. A
//! provider that cannot be built (unknown type, missing key) is reported and
//! the service runs on local recommendations instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{ChatProvider, ProviderError};
use crate::config::ProviderSettings;

/// Builds one kind of provider.
pub trait ProviderFactory: Send + Sync {
    /// Name used in config, e.g. "groq".
    fn provider_type(&self) -> &'static str;

    /// Build a client from the provider's JSON settings.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ChatProvider>, ProviderError>;

    /// Check credentials and settings without building a client.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// One line for `shelfwise config`.
    fn description(&self) -> &'static str;
}

/// Provider factories by type name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the providers compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "groq")]
        registry.register(Arc::new(super::GroqProviderFactory));
        registry
    }

    /// Add a factory. A later factory with the same type wins.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        let provider_type = factory.provider_type();
        if self.factories.insert(provider_type, factory).is_some() {
            tracing::debug!(provider_type, "Replaced provider factory");
        }
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type '{}' (built with: {})",
                provider_type,
                self.available_types().join(", ")
            ))
        })
    }

    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        self.factory(provider_type)?.create(config)
    }

    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    /// Build the provider `settings` name, or `None` when that is not
    /// possible. Absence is a supported mode, so this only warns.
    pub fn resolve(&self, settings: &ProviderSettings) -> Option<Arc<dyn ChatProvider>> {
        match self.create(&settings.provider_type, &settings.factory_config()) {
            Ok(provider) => {
                tracing::info!(
                    provider = provider.name(),
                    model = %settings.model,
                    "Provider configured"
                );
                Some(provider)
            }
            Err(e) => {
                tracing::warn!(
                    provider_type = %settings.provider_type,
                    error = %e,
                    "Provider unavailable, serving fallback recommendations"
                );
                None
            }
        }
    }

    /// `(type, description)` for each registered provider, sorted by type.
    pub fn providers(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.factories
            .iter()
            .map(|(provider_type, factory)| (*provider_type, factory.description()))
    }

    pub fn available_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
