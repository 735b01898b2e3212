//! User memory collaborator.
//!
//! The memory store holds free-text notes about a user's preferences. The
//! orchestrator only reads it to enrich prompts and writes interaction notes;
//! a failing store never fails a request.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use shelfwise_core::StoreMode;

#[cfg(feature = "mem0")]
mod mem0;

#[cfg(feature = "mem0")]
pub use mem0::{Mem0Store, MEM0_KEY};

/// Errors from the memory store.
#[derive(Error, Debug, Clone)]
pub enum MemoryError {
    #[error("Memory store unreachable: {0}")]
    Transport(String),

    #[error("Memory store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unreadable memory store response: {0}")]
    MalformedResponse(String),

    #[error("No memory store response within {0:?}")]
    Timeout(Duration),

    #[error("Memory store not configured: {0}")]
    NotConfigured(String),
}

/// One remembered fact about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl MemoryEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            id: None,
            score: None,
        }
    }
}

/// Store of user memories.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Memories relevant to `query`, most relevant first.
    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Remember `text` for `user_id`.
    async fn add(&self, text: &str, user_id: &str) -> Result<(), MemoryError>;

    /// Store name for logs and status.
    fn name(&self) -> &str;
}

/// Query used to look up shopping preferences.
pub fn preference_query(store_mode: StoreMode) -> String {
    format!("{} preferences shopping history", store_mode.as_str())
}

/// Flatten entries into the blob embedded in the prompt.
pub fn join_entries(entries: &[MemoryEntry]) -> String {
    entries
        .iter()
        .map(|e| e.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a search response body.
///
/// Accepts a bare array or an object with a `results` array. Each entry is
/// either a string or an object carrying its text in `memory` or `content`.
/// Entries without text are skipped.
pub fn parse_search_results(body: &JsonValue) -> Result<Vec<MemoryEntry>, MemoryError> {
    let items = match body {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => match map.get("results") {
            Some(JsonValue::Array(items)) => items,
            Some(JsonValue::Null) | None => return Ok(Vec::new()),
            Some(_) => {
                return Err(MemoryError::MalformedResponse(
                    "'results' is not an array".to_string(),
                ))
            }
        },
        JsonValue::Null => return Ok(Vec::new()),
        _ => {
            return Err(MemoryError::MalformedResponse(
                "Search response is neither an array nor an object".to_string(),
            ))
        }
    };

    Ok(items.iter().filter_map(parse_entry).collect())
}

fn parse_entry(item: &JsonValue) -> Option<MemoryEntry> {
    match item {
        JsonValue::String(text) => Some(MemoryEntry::new(text.as_str())),
        JsonValue::Object(map) => {
            let text = map
                .get("memory")
                .or_else(|| map.get("content"))
                .and_then(JsonValue::as_str)?;

            let id = match map.get("id") {
                Some(JsonValue::String(s)) => Some(s.clone()),
                Some(JsonValue::Number(n)) => Some(n.to_string()),
                _ => None,
            };

            Some(MemoryEntry {
                text: text.to_string(),
                id,
                score: map.get("score").and_then(JsonValue::as_f64),
            })
        }
        _ => None,
    }
}
