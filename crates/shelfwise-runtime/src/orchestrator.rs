//! Recommendation orchestrator.
//!
//! The orchestrator composes the resilience pieces:
//! - Remote attempt: provider call through the circuit breaker, with the
//!   retry policy running inside the guarded operation
//! - Extraction of the provider's (possibly malformed) text
//! - Top-up of a short AI result with popular items
//! - Local fallback on any failure
//!
//! Its public methods never fail. Every problem below it ends up in the
//! result's `source` and `confidence`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use shelfwise_core::{
    CatalogItem, ExtractionError, FallbackRecommender, InteractionRequest, ParsedRecommendations,
    RecommendationRequest, RecommendationResult, RecommendationSource, RecommendedItem,
    ResponseExtractor,
};

use crate::cache::{ContextKey, MemoryContextCache};
use crate::config::{ConfigError, RuntimeConfig};
use crate::memory::{join_entries, preference_query, MemoryStore};
use crate::prompts::{build_messages, PromptInput};
use crate::providers::{ChatProvider, CompletionParams, ProviderError, ProviderRegistry};
use crate::resilience::{
    deadline_in, BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState, RetryError,
    RetryPolicy,
};

/// Why the remote path was abandoned.
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("Provider not configured")]
    NotConfigured,

    #[error("Empty catalog")]
    EmptyCatalog,

    #[error("Circuit open for {dependency}")]
    CircuitOpen {
        dependency: String,
        retry_in: Option<Duration>,
    },

    #[error("Provider failed after {attempts} attempt(s): {error}")]
    Provider { attempts: u32, error: ProviderError },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("No recommended id matched the catalog")]
    NoCatalogMatch,
}

impl RecommendError {
    /// Source tag of the fallback result this error leads to.
    pub fn fallback_source(&self) -> RecommendationSource {
        match self {
            RecommendError::NotConfigured | RecommendError::EmptyCatalog => {
                RecommendationSource::Fallback
            }
            RecommendError::CircuitOpen { .. }
            | RecommendError::Provider { .. }
            | RecommendError::DeadlineExceeded => RecommendationSource::SmartFallbackApiError,
            RecommendError::Extraction(_) | RecommendError::NoCatalogMatch => {
                RecommendationSource::SmartFallback
            }
        }
    }
}

impl From<BreakerError<RetryError<ProviderError>>> for RecommendError {
    fn from(err: BreakerError<RetryError<ProviderError>>) -> Self {
        match err {
            BreakerError::Open { dependency, retry_in } => {
                RecommendError::CircuitOpen { dependency, retry_in }
            }
            BreakerError::Inner(RetryError::DeadlineExceeded { .. }) => {
                RecommendError::DeadlineExceeded
            }
            BreakerError::Inner(RetryError::Exhausted { attempts, last }) => {
                RecommendError::Provider { attempts, error: last }
            }
            BreakerError::Inner(RetryError::Permanent { attempts, error }) => {
                RecommendError::Provider { attempts, error }
            }
        }
    }
}

/// Health document for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    #[serde(flatten)]
    pub breaker: BreakerSnapshot,

    /// Breaker is CLOSED
    pub is_healthy: bool,

    /// Requests are currently served from the fallback path
    pub fallback_mode: bool,

    /// The local recommender is always there
    pub smart_fallback_available: bool,

    pub provider_configured: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    pub memory_configured: bool,
}

/// Recommendation orchestrator.
///
/// One instance is shared by all requests; the circuit breaker inside it is
/// the only state that outlives a request.
pub struct RecommendationOrchestrator {
    provider: Option<Arc<dyn ChatProvider>>,
    memory: Option<Arc<dyn MemoryStore>>,
    config: RuntimeConfig,
    params: CompletionParams,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    extractor: ResponseExtractor,
    fallback: FallbackRecommender,
    memory_cache: MemoryContextCache,
}

impl RecommendationOrchestrator {
    /// Create an orchestrator from explicit collaborators.
    pub fn new(
        provider: Option<Arc<dyn ChatProvider>>,
        memory: Option<Arc<dyn MemoryStore>>,
        config: RuntimeConfig,
    ) -> Self {
        let dependency = provider
            .as_ref()
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| config.provider.provider_type.clone());

        Self {
            breaker: CircuitBreaker::new(dependency, config.circuit_breaker.clone()),
            retry: RetryPolicy::new(config.retry.clone()),
            params: CompletionParams::from(&config.provider),
            memory_cache: MemoryContextCache::new(
                config.memory.cache_capacity,
                config.memory.cache_ttl,
            ),
            extractor: ResponseExtractor::new(),
            fallback: FallbackRecommender::new(),
            provider,
            memory,
            config,
        }
    }

    /// Wire collaborators from configuration.
    ///
    /// A provider that cannot be created (missing or placeholder key,
    /// unknown type) is not an error: the orchestrator runs in fallback mode.
    pub fn from_config(config: RuntimeConfig, registry: &ProviderRegistry) -> Result<Self, ConfigError> {
        config.validate()?;

        let provider = registry.resolve(&config.provider);
        let memory = Self::memory_from_config(&config);
        Ok(Self::new(provider, memory, config))
    }

    #[cfg(feature = "mem0")]
    fn memory_from_config(config: &RuntimeConfig) -> Option<Arc<dyn MemoryStore>> {
        let mut json = serde_json::json!({});
        if let Some(url) = &config.memory.base_url {
            json["base_url"] = serde_json::Value::String(url.clone());
        }

        match crate::memory::Mem0Store::from_config(&json, config.memory.timeout) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "Memory store unavailable, prompts will omit preferences");
                None
            }
        }
    }

    #[cfg(not(feature = "mem0"))]
    fn memory_from_config(_config: &RuntimeConfig) -> Option<Arc<dyn MemoryStore>> {
        None
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Recommend items using the configured request deadline.
    pub async fn get_recommendations(&self, request: &RecommendationRequest) -> RecommendationResult {
        let deadline = deadline_in(self.config.recommendations.deadline);
        self.get_recommendations_until(request, deadline).await
    }

    /// Recommend items, abandoning the remote path at `deadline`.
    ///
    /// A provider answer arriving after the deadline is dropped with the
    /// abandoned future; it never reaches the returned result.
    pub async fn get_recommendations_until(
        &self,
        request: &RecommendationRequest,
        deadline: Instant,
    ) -> RecommendationResult {
        let cap = self.config.recommendations.cap_for(request.limit);

        let remote = match tokio::time::timeout_at(deadline, self.recommend_remote(request, cap, deadline)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RecommendError::DeadlineExceeded),
        };

        match remote {
            Ok(result) => {
                tracing::info!(
                    user_id = %request.user_id,
                    source = %result.source,
                    items = result.items.len(),
                    "Generated recommendations"
                );
                result
            }
            Err(err) => {
                let source = err.fallback_source();
                match &err {
                    RecommendError::NotConfigured => tracing::debug!(
                        user_id = %request.user_id,
                        "No provider configured, using fallback"
                    ),
                    RecommendError::EmptyCatalog => tracing::debug!(
                        user_id = %request.user_id,
                        "Empty catalog, provider not called"
                    ),
                    RecommendError::CircuitOpen { dependency, retry_in } => tracing::warn!(
                        user_id = %request.user_id,
                        dependency = %dependency,
                        retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                        "Circuit open, provider not called"
                    ),
                    RecommendError::Extraction(e) => tracing::warn!(
                        user_id = %request.user_id,
                        error = %e,
                        sample = e.sample(),
                        "Could not parse provider output"
                    ),
                    other => tracing::warn!(
                        user_id = %request.user_id,
                        error = %other,
                        source = %source,
                        "Remote recommendation failed"
                    ),
                }
                self.fallback_result(source, request, cap)
            }
        }
    }

    async fn recommend_remote(
        &self,
        request: &RecommendationRequest,
        cap: usize,
        deadline: Instant,
    ) -> Result<RecommendationResult, RecommendError> {
        let provider = self.provider.as_ref().ok_or(RecommendError::NotConfigured)?;
        if request.products.is_empty() {
            return Err(RecommendError::EmptyCatalog);
        }

        let memory_context = self.memory_context(request).await;
        let messages = build_messages(&PromptInput {
            request,
            memory_context: &memory_context,
            catalog_limit: self.config.recommendations.prompt_catalog_limit,
            cap,
        });

        let response = self
            .breaker
            .execute(|| {
                self.retry
                    .run(Some(deadline), || provider.complete(&messages, &self.params))
            })
            .await?;

        if response.truncated() {
            tracing::debug!(model = %response.model, "Provider output hit the token limit");
        }
        tracing::debug!(
            sample = %shelfwise_core::extract::truncate_sample(&response.text),
            "Raw provider output"
        );

        let parsed = self.extractor.extract(&response.text)?;
        self.assemble(parsed, &request.products, cap)
    }

    /// Map provider ids onto the catalog and top up with popular items.
    fn assemble(
        &self,
        parsed: ParsedRecommendations,
        catalog: &[CatalogItem],
        cap: usize,
    ) -> Result<RecommendationResult, RecommendError> {
        let ParsedRecommendations {
            recommendations,
            overall_reasoning,
            confidence,
            salvaged,
        } = parsed;

        let mut by_id: HashMap<&str, &CatalogItem> = HashMap::with_capacity(catalog.len());
        for item in catalog {
            by_id.entry(item.id.as_str()).or_insert(item);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut items = Vec::with_capacity(cap);
        for rec in recommendations {
            if items.len() >= cap {
                break;
            }
            match by_id.get(rec.id.trim()) {
                Some(item) if seen.insert(item.id.as_str()) => {
                    items.push(RecommendedItem::with_reasoning((*item).clone(), rec.reasoning));
                }
                Some(_) => {}
                None => tracing::debug!(id = %rec.id, "Dropping recommendation not in catalog"),
            }
        }

        if items.is_empty() {
            return Err(RecommendError::NoCatalogMatch);
        }

        let matched = items.len();
        if matched < cap {
            let fill = self.fallback.popularity_fill(catalog, &seen, cap - matched);
            items.extend(fill.into_iter().map(RecommendedItem::plain));
        }

        tracing::debug!(matched, topped_up = items.len() - matched, salvaged, "Assembled AI result");
        Ok(RecommendationResult::ai(items, overall_reasoning, confidence))
    }

    fn fallback_result(
        &self,
        source: RecommendationSource,
        request: &RecommendationRequest,
        cap: usize,
    ) -> RecommendationResult {
        let items = self
            .fallback
            .recommend(&request.products, &request.context(), cap)
            .into_iter()
            .map(RecommendedItem::plain)
            .collect();
        RecommendationResult::fallback(source, items)
    }

    /// Memory blob for the prompt. Failures and timeouts yield "".
    async fn memory_context(&self, request: &RecommendationRequest) -> String {
        let Some(memory) = self.memory.as_ref() else {
            return String::new();
        };

        let query = preference_query(request.store_mode);
        let key = ContextKey::new(request.user_id.as_str(), query.as_str());
        if let Some(cached) = self.memory_cache.get(&key).await {
            return cached;
        }

        let search = memory.search(&query, &request.user_id, self.config.memory.search_limit);
        match tokio::time::timeout(self.config.memory.timeout, search).await {
            Ok(Ok(entries)) => {
                let context = join_entries(&entries);
                self.memory_cache.insert(key, context.clone()).await;
                context
            }
            Ok(Err(e)) => {
                tracing::warn!(user_id = %request.user_id, error = %e, "Could not fetch user memories");
                String::new()
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %request.user_id,
                    timeout_ms = self.config.memory.timeout.as_millis() as u64,
                    "Memory search timed out"
                );
                String::new()
            }
        }
    }

    /// Remember an interaction. Returns whether the memory store took it;
    /// a failure here never fails the caller.
    pub async fn record_interaction(&self, request: &InteractionRequest) -> bool {
        let Some(memory) = self.memory.as_ref() else {
            tracing::debug!(user_id = %request.user_id, "No memory store, interaction not recorded");
            return false;
        };

        let message = request.memory_message();
        match tokio::time::timeout(self.config.memory.timeout, memory.add(&message, &request.user_id)).await {
            Ok(Ok(())) => {
                self.memory_cache.invalidate_user(&request.user_id);
                tracing::info!(
                    user_id = %request.user_id,
                    product_id = %request.product_id,
                    interaction = %request.interaction_type,
                    "Saved recommendation interaction"
                );
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(user_id = %request.user_id, error = %e, "Could not save interaction");
                false
            }
            Err(_) => {
                tracing::warn!(user_id = %request.user_id, "Saving interaction timed out");
                false
            }
        }
    }

    /// Current health, for the status endpoint.
    pub fn status(&self) -> ServiceStatus {
        let breaker = self.breaker.snapshot();
        ServiceStatus {
            is_healthy: breaker.is_healthy(),
            fallback_mode: breaker.state != CircuitState::Closed || self.provider.is_none(),
            smart_fallback_available: true,
            provider_configured: self.provider.is_some(),
            provider: self.provider.as_ref().map(|p| p.name().to_string()),
            memory_configured: self.memory.is_some(),
            breaker,
        }
    }
}

/// Builder for RecommendationOrchestrator.
pub struct RecommendationOrchestratorBuilder {
    provider: Option<Arc<dyn ChatProvider>>,
    memory: Option<Arc<dyn MemoryStore>>,
    config: RuntimeConfig,
}

impl RecommendationOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            provider: None,
            memory: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Set the inference provider.
    pub fn provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the memory store.
    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<RecommendationOrchestrator, ConfigError> {
        self.config.validate()?;
        Ok(RecommendationOrchestrator::new(
            self.provider,
            self.memory,
            self.config,
        ))
    }
}

impl Default for RecommendationOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
