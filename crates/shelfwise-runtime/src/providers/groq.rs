//! Groq chat-completions client.
//!
//! Groq speaks the OpenAI chat-completions dialect, so `base_url` can point
//! this client at any compatible endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::factory::ProviderFactory;
use super::secrets::{ApiCredential, KeyOrigin, KeySpec};
use super::{ChatMessage, ChatProvider, Completion, CompletionParams, ProviderError, TokenUsage};

/// Where the Groq key is looked up.
pub const GROQ_KEY: KeySpec = KeySpec {
    label: "Groq API key",
    config_key: "api_key",
    env_var: "GROQ_API_KEY",
};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct GroqProvider {
    credential: ApiCredential,
    endpoint: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for GroqProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqProvider")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GroqProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let credential = ApiCredential::new(api_key, KeyOrigin::Explicit, GROQ_KEY.label);
        Self::build(credential, DEFAULT_BASE_URL)
    }

    /// Build from the provider section of the runtime config.
    ///
    /// The key comes from `api_key`, else `GROQ_API_KEY`; placeholders count
    /// as missing.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = GROQ_KEY.require(config)?;
        Self::build(credential, config["base_url"].as_str().unwrap_or(DEFAULT_BASE_URL))
    }

    fn build(credential: ApiCredential, base_url: &str) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            credential,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Error for a non-2xx answer. `retry_after` is the raw header value.
fn classify_failure(status: StatusCode, retry_after: Option<&str>, body: &str) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized {
            status: status.as_u16(),
        },
        _ => {
            // OpenAI-style `{"error": {"message": ...}}`, else the raw body
            let message = serde_json::from_str::<JsonValue>(body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
                .unwrap_or_else(|| shelfwise_core::extract::truncate_sample(body));
            ProviderError::Status {
                status: status.as_u16(),
                message,
            }
        }
    }
}

fn first_choice(body: ChatResponse, requested_model: &str) -> Result<Completion, ProviderError> {
    let ChatResponse { choices, model, usage } = body;
    let choice = choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".to_string()))?;

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        model: model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested_model.to_string()),
        finish_reason: choice.finish_reason,
        usage: usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    })
}

#[async_trait]
impl ChatProvider for GroqProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.credential.expose())
            .timeout(params.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(params.timeout)
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, retry_after.as_deref(), &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let completion = first_choice(body, &params.model)?;
        tracing::debug!(
            model = %completion.model,
            finish_reason = ?completion.finish_reason,
            prompt_tokens = completion.usage.map(|u| u.prompt_tokens),
            completion_tokens = completion.usage.map(|u| u.completion_tokens),
            "Groq completion received"
        );
        Ok(completion)
    }

    fn name(&self) -> &str {
        "groq"
    }
}

/// Builds [`GroqProvider`]s. Reads `api_key` (optional, else env) and
/// `base_url` (optional).
pub struct GroqProviderFactory;

impl ProviderFactory for GroqProviderFactory {
    fn provider_type(&self) -> &'static str {
        "groq"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        self.validate_config(config)?;
        Ok(Arc::new(GroqProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(format!(
                    "base_url '{}' is not an http(s) URL",
                    url
                )));
            }
        }

        if !GROQ_KEY.is_available(config) {
            return Err(ProviderError::NotConfigured(GROQ_KEY.missing()));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Groq OpenAI-compatible chat completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_from_base_url() {
        let provider = GroqProvider::new("gsk_test").unwrap();
        assert_eq!(provider.endpoint, "https://api.groq.com/openai/v1/chat/completions");

        let provider = GroqProvider::from_config(&json!({
            "api_key": "gsk_config",
            "base_url": "http://localhost:8080/v1/"
        }))
        .unwrap();
        assert_eq!(provider.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(provider.credential.origin(), KeyOrigin::Config);
    }

    #[test]
    fn test_placeholder_key_is_not_configured() {
        // Only meaningful when the environment does not supply a real key.
        if std::env::var(GROQ_KEY.env_var).is_err() {
            let config = json!({ "api_key": "your-groq-api-key-here" });
            assert!(matches!(
                GroqProvider::from_config(&config),
                Err(ProviderError::NotConfigured(_))
            ));
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let provider = GroqProvider::new("gsk_super_secret_key_12345").unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("gsk_super_secret_key_12345"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_request_body() {
        let messages = [ChatMessage::system("sys"), ChatMessage::user("hi")];
        let json = serde_json::to_value(ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 1000,
        })
        .unwrap();

        assert_eq!(json["model"], "m");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_first_choice() {
        let body: ChatResponse = serde_json::from_value(json!({
            "model": "llama",
            "choices": [{
                "message": {"role": "assistant", "content": "{\"recommendations\": []}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }))
        .unwrap();

        let completion = first_choice(body, "requested").unwrap();
        assert_eq!(completion.text, "{\"recommendations\": []}");
        assert_eq!(completion.model, "llama");
        assert_eq!(
            completion.usage,
            Some(TokenUsage { prompt_tokens: 120, completion_tokens: 30 })
        );
        assert!(!completion.truncated());
    }

    #[test]
    fn test_first_choice_defaults() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": null}}]
        }))
        .unwrap();
        let completion = first_choice(body, "requested").unwrap();
        assert_eq!(completion.text, "");
        assert_eq!(completion.model, "requested");

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            first_choice(empty, "m"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_classify_failure() {
        match classify_failure(StatusCode::TOO_MANY_REQUESTS, Some("2.5"), "") {
            ProviderError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_millis(2500)))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, None, ""),
            ProviderError::Unauthorized { status: 403 }
        ));

        let body = r#"{"error": {"message": "model overloaded", "type": "server_error"}}"#;
        match classify_failure(StatusCode::SERVICE_UNAVAILABLE, None, body) {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        match classify_failure(StatusCode::BAD_GATEWAY, None, "<html>bad gateway</html>") {
            ProviderError::Status { message, .. } => assert_eq!(message, "<html>bad gateway</html>"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_factory_rejects_bad_base_url() {
        let config = json!({ "api_key": "gsk_test", "base_url": "invalid-url" });
        assert!(GroqProviderFactory.validate_config(&config).is_err());
        assert!(GroqProviderFactory.create(&config).is_err());
    }

    #[test]
    fn test_factory_creates_provider() {
        let provider = GroqProviderFactory
            .create(&json!({ "api_key": "gsk_test" }))
            .unwrap();
        assert_eq!(provider.name(), "groq");
    }
}
