//! Caching layer for memory context.
//!
//! Recommendation requests tend to arrive in bursts for the same user. The
//! memory context for a `(user, query)` pair is cached for a short TTL so
//! those bursts hit the memory store once. Only successful lookups are
//! stored.

use moka::future::Cache;
use std::time::Duration;

/// Cache key for memory context.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContextKey {
    user_id: String,
    query: String,
}

impl ContextKey {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
        }
    }
}

/// TTL-bounded `(user, query) -> context` map.
pub struct MemoryContextCache {
    cache: Cache<ContextKey, String>,
}

impl MemoryContextCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &ContextKey) -> Option<String> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: ContextKey, context: String) {
        self.cache.insert(key, context).await;
    }

    /// Drop every cached context for a user, e.g. after recording an
    /// interaction for them.
    pub fn invalidate_user(&self, user_id: &str) {
        let user_id = user_id.to_string();
        if let Err(e) = self
            .cache
            .invalidate_entries_if(move |key, _| key.user_id == user_id)
        {
            tracing::debug!(error = %e, "Per-user invalidation unavailable, clearing cache");
            self.cache.invalidate_all();
        }
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MemoryContextCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(300))
    }
}
