//! # shelfwise-runtime
//!
//! Resilient AI recommendations for Shelfwise.
//!
//! This crate wraps an inference provider in a circuit breaker and a retry
//! policy, parses whatever text comes back, and falls back to the
//! deterministic recommender in `shelfwise-core` when any of that fails.
//!
//! ## Guarantees
//!
//! - `RecommendationOrchestrator::get_recommendations` never returns an
//!   error. The result's `source` says which path produced it.
//! - A request never outlives its deadline; a late provider answer is
//!   discarded.
//! - The memory collaborator is optional; its failures only cost prompt
//!   context.
//!
//! ## Example
//!
//! ```rust,ignore
//! use shelfwise_runtime::{ProviderRegistry, RecommendationOrchestrator, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("shelfwise.yaml")?;
//! let orchestrator = RecommendationOrchestrator::from_config(config, &ProviderRegistry::with_defaults())?;
//!
//! let response = shelfwise_runtime::api::handle_recommendations(&orchestrator, &body).await;
//! println!("{}", response.body);
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod memory;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use api::ApiResponse;
pub use config::{ConfigError, RuntimeConfig};
pub use memory::{MemoryEntry, MemoryError, MemoryStore};
pub use orchestrator::{
    RecommendError, RecommendationOrchestrator, RecommendationOrchestratorBuilder, ServiceStatus,
};
pub use providers::{ChatProvider, ProviderError, ProviderRegistry};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy};
