//! Mem0 memory store client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{parse_search_results, MemoryEntry, MemoryError, MemoryStore};
use crate::providers::{ApiCredential, KeySpec};

/// Where the Mem0 key is looked up.
pub const MEM0_KEY: KeySpec = KeySpec {
    label: "Mem0 API key",
    config_key: "api_key",
    env_var: "MEM0_API_KEY",
};

const DEFAULT_BASE_URL: &str = "https://api.mem0.ai/v1";

/// Mem0 hosted memory API.
pub struct Mem0Store {
    credential: ApiCredential,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for Mem0Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem0Store")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: &'a str,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    messages: [AddMessage<'a>; 1],
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AddMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl Mem0Store {
    /// Create from JSON configuration with environment fallback.
    ///
    /// Reads `api_key` from the config, then `MEM0_API_KEY`; `base_url` is
    /// optional.
    pub fn from_config(config: &JsonValue, timeout: Duration) -> Result<Self, MemoryError> {
        let credential = MEM0_KEY
            .resolve(config)
            .ok_or_else(|| MemoryError::NotConfigured(MEM0_KEY.missing()))?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MemoryError::Transport(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            credential,
            base_url,
            timeout,
            client,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<JsonValue, MemoryError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.credential.expose()))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MemoryError::Timeout(self.timeout)
                } else {
                    MemoryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Status {
                status: status.as_u16(),
                message: shelfwise_core::extract::truncate_sample(&body),
            });
        }

        // Some endpoints answer with an empty body.
        let text = response
            .text()
            .await
            .map_err(|e| MemoryError::Transport(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&text).map_err(|e| MemoryError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl MemoryStore for Mem0Store {
    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let body = self
            .post("/memories/search/", &SearchRequest { query, user_id, limit })
            .await?;
        let entries = parse_search_results(&body)?;
        tracing::debug!(user_id, found = entries.len(), "Mem0 search complete");
        Ok(entries)
    }

    async fn add(&self, text: &str, user_id: &str) -> Result<(), MemoryError> {
        let request = AddRequest {
            messages: [AddMessage {
                role: "user",
                content: text,
            }],
            user_id,
        };
        self.post("/memories/", &request).await?;
        tracing::debug!(user_id, "Mem0 memory added");
        Ok(())
    }

    fn name(&self) -> &str {
        "mem0"
    }
}
