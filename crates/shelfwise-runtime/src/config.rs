//! Runtime configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//! Durations are written the human way (`"30s"`, `"5m"`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Longest duration any setting may hold.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderSettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub recommendations: RecommendationSettings,
    pub memory: MemorySettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            circuit_breaker: CircuitBreakerConfig::recommendations(),
            retry: RetryConfig::default(),
            recommendations: RecommendationSettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.reset_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "circuit_breaker.reset_timeout must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_retries must allow at least one attempt".to_string(),
            ));
        }
        if self.recommendations.cap == 0 || self.recommendations.cap > self.recommendations.max_cap {
            return Err(ConfigError::Invalid(format!(
                "recommendations.cap must be between 1 and max_cap ({})",
                self.recommendations.max_cap
            )));
        }
        let durations = [
            ("provider.timeout", self.provider.timeout),
            ("circuit_breaker.reset_timeout", self.circuit_breaker.reset_timeout),
            ("retry.base_delay", self.retry.base_delay),
            ("retry.max_delay", self.retry.max_delay),
            ("recommendations.deadline", self.recommendations.deadline),
            ("memory.timeout", self.memory.timeout),
            ("memory.cache_ttl", self.memory.cache_ttl),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| *d > MAX_DURATION) {
            return Err(ConfigError::Invalid(format!(
                "{} must be at most {}",
                name,
                humantime::format_duration(MAX_DURATION)
            )));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid(
                "provider.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inference provider settings.
///
/// Credentials are not part of this struct. Clients built from it read their
/// key from the environment (`GROQ_API_KEY`); only code calling a factory
/// directly can pass `api_key` in the JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registered provider type, e.g. "groq"
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Model identifier
    pub model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Per-request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Custom API endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_type: "groq".to_string(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(15),
            base_url: None,
        }
    }
}

impl ProviderSettings {
    /// JSON handed to a provider factory.
    pub fn factory_config(&self) -> JsonValue {
        let mut config = serde_json::json!({ "model": self.model });
        if let Some(url) = &self.base_url {
            config["base_url"] = JsonValue::String(url.clone());
        }
        config
    }
}

/// Recommendation shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationSettings {
    /// Items returned when the caller does not ask for a number
    pub cap: usize,

    /// Largest number a caller may ask for
    pub max_cap: usize,

    /// Catalog items included in the prompt
    pub prompt_catalog_limit: usize,

    /// Overall budget for one request's remote path
    #[serde(with = "duration_str")]
    pub deadline: Duration,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            cap: 4,
            max_cap: 8,
            prompt_catalog_limit: 20,
            deadline: Duration::from_secs(20),
        }
    }
}

impl RecommendationSettings {
    /// Cap for a request, honouring the caller's `limit` within bounds.
    pub fn cap_for(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.cap).clamp(1, self.max_cap.max(1))
    }
}

/// Memory collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Memories requested per search
    pub search_limit: usize,

    /// Timeout for a single memory call
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    #[serde(with = "duration_str")]
    pub cache_ttl: Duration,

    pub cache_capacity: u64,

    /// Custom API endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            search_limit: 10,
            timeout: Duration::from_secs(3),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
            base_url: None,
        }
    }
}

/// Serde adapter for human-readable durations.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Secs(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        }
    }
}
