//! API keys for the provider and memory clients.
//!
//! Keys are wrapped in `SecretString` as soon as they are read. Values that
//! are obviously sample-file placeholders count as absent, so a service
//! started from an unedited `.env` runs in fallback mode instead of failing
//! every call with an auth error.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use super::ProviderError;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"(?i)^(?:<.*>|your[-_].*|.*replace[-_]with.*|.*[-_]here)?$").unwrap();
}

/// Blank values and the placeholders sample env files ship with, e.g.
/// `your-groq-api-key-here` or `test-key-replace-with-real-key`.
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value.trim())
}

/// Where a client looks for its key: a field of its JSON config, then an
/// environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    /// Human name, used in messages
    pub label: &'static str,
    pub config_key: &'static str,
    pub env_var: &'static str,
}

impl KeySpec {
    /// The first usable key, if any.
    pub fn resolve(&self, config: &JsonValue) -> Option<ApiCredential> {
        if let Some(value) = config[self.config_key].as_str() {
            if !is_placeholder(value) {
                return Some(ApiCredential::new(value.trim(), KeyOrigin::Config, self.label));
            }
            tracing::debug!(key = self.config_key, "Placeholder key in config");
        }

        let value = std::env::var(self.env_var).ok()?;
        if is_placeholder(&value) {
            tracing::warn!(env_var = self.env_var, "Ignoring placeholder {}", self.label);
            return None;
        }
        Some(ApiCredential::new(value.trim(), KeyOrigin::Environment, self.label))
    }

    /// Like [`resolve`](Self::resolve), for clients that cannot work without a key.
    pub fn require(&self, config: &JsonValue) -> Result<ApiCredential, ProviderError> {
        self.resolve(config)
            .ok_or_else(|| ProviderError::NotConfigured(self.missing()))
    }

    /// Check for a usable key without wrapping it.
    pub fn is_available(&self, config: &JsonValue) -> bool {
        config[self.config_key].as_str().is_some_and(|v| !is_placeholder(v))
            || std::env::var(self.env_var).is_ok_and(|v| !is_placeholder(&v))
    }

    /// Message for a missing key, naming both places it may come from.
    pub fn missing(&self) -> String {
        format!(
            "no {} (set '{}' in config or {})",
            self.label, self.config_key, self.env_var
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Config,
    Environment,
    /// Passed in by code
    Explicit,
}

impl KeyOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOrigin::Config => "config",
            KeyOrigin::Environment => "environment",
            KeyOrigin::Explicit => "explicit",
        }
    }
}

/// An API key. Only [`expose`](Self::expose) reveals the value.
pub struct ApiCredential {
    secret: SecretString,
    origin: KeyOrigin,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, origin: KeyOrigin, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            origin,
            label,
        }
    }

    /// Reveal the key where it is sent, e.g. an `Authorization` header.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [REDACTED] ({})", self.label, self.origin.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(env_var: &'static str) -> KeySpec {
        KeySpec {
            label: "Test key",
            config_key: "api_key",
            env_var,
        }
    }

    #[test]
    fn test_debug_is_redacted() {
        let cred = ApiCredential::new("gsk_super_secret_key_12345", KeyOrigin::Explicit, "Groq API key");
        let debug = format!("{:?}", cred);

        assert_eq!(debug, "Groq API key [REDACTED] (explicit)");
        assert_eq!(cred.expose(), "gsk_super_secret_key_12345");
    }

    #[test]
    fn test_placeholders() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("   "));
        assert!(is_placeholder("your-groq-api-key-here"));
        assert!(is_placeholder("test-key-replace-with-real-key"));
        assert!(is_placeholder("<MEM0_API_KEY>"));
        assert!(!is_placeholder("gsk_live_abc123"));
        assert!(!is_placeholder("m0-abcdef"));
    }

    #[test]
    fn test_config_wins_over_env() {
        std::env::set_var("SHELFWISE_TEST_KEY_PRIORITY", "env-key");
        let cred = spec("SHELFWISE_TEST_KEY_PRIORITY")
            .resolve(&json!({ "api_key": " config-key " }))
            .unwrap();
        std::env::remove_var("SHELFWISE_TEST_KEY_PRIORITY");

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.origin(), KeyOrigin::Config);
    }

    #[test]
    fn test_placeholder_in_config_falls_back_to_env() {
        std::env::set_var("SHELFWISE_TEST_KEY_FALLBACK", "env-key");
        let cred = spec("SHELFWISE_TEST_KEY_FALLBACK")
            .require(&json!({ "api_key": "your-groq-api-key-here" }))
            .unwrap();
        std::env::remove_var("SHELFWISE_TEST_KEY_FALLBACK");

        assert_eq!(cred.origin(), KeyOrigin::Environment);
        assert_eq!(cred.expose(), "env-key");
    }

    #[test]
    fn test_placeholder_env_is_absent() {
        std::env::set_var("SHELFWISE_TEST_KEY_PLACEHOLDER", "test-key-replace-with-real-key");
        let spec = spec("SHELFWISE_TEST_KEY_PLACEHOLDER");
        let available = spec.is_available(&json!({}));
        let required = spec.require(&json!({}));
        std::env::remove_var("SHELFWISE_TEST_KEY_PLACEHOLDER");

        assert!(!available);
        assert!(matches!(required, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_missing_message_names_both_sources() {
        let message = spec("SHELFWISE_NONEXISTENT_VAR")
            .require(&json!({}))
            .unwrap_err()
            .to_string();

        assert!(message.contains("Test key"));
        assert!(message.contains("'api_key'"));
        assert!(message.contains("SHELFWISE_NONEXISTENT_VAR"));
    }
}
