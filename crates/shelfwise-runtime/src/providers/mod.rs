//! Chat-completion providers.
//!
//! A provider turns the prompt messages into raw assistant text. It does not
//! retry, parse, or fall back; the orchestrator layers those on top. Error
//! variants say whether a second attempt could help (see `RetryClassify`).
//!
//! Credentials go through [`secrets`]; keys never reach `Debug` output.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderSettings;
use crate::resilience::RetryClassify;

mod factory;
pub mod secrets;

#[cfg(feature = "groq")]
mod groq;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, KeyOrigin, KeySpec};

#[cfg(feature = "groq")]
pub use groq::{GroqProvider, GroqProviderFactory, GROQ_KEY};

/// Errors from a provider call.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider unreachable: {0}")]
    Transport(String),

    #[error("Provider rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Provider rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("Unreadable provider response: {0}")]
    MalformedResponse(String),

    #[error("No provider response within {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl RetryClassify for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            // 4xx other than request timeout fails the same way again
            ProviderError::Status { status, .. } => *status >= 500 || *status == 408,
            ProviderError::Unauthorized { .. }
            | ProviderError::MalformedResponse(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Per-call sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Transport timeout for one attempt
    pub timeout: Duration,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self::from(&ProviderSettings::default())
    }
}

impl From<&ProviderSettings> for CompletionParams {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout,
        }
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Raw provider answer.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Assistant text, possibly fenced or truncated JSON
    pub text: String,

    /// Model that answered
    pub model: String,

    /// e.g. "stop" or "length"
    pub finish_reason: Option<String>,

    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// The provider ran out of tokens mid-answer.
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<Completion, ProviderError>;

    /// Name for logs, status and the breaker.
    fn name(&self) -> &str;
}
