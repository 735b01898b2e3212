//! Resilience patterns for shelfwise-runtime.
//!
//! This module provides:
//! - Circuit breaker so a failing provider is not called on every request
//! - Retry with capped exponential backoff for transient errors

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use retry::{deadline_in, RetryClassify, RetryConfig, RetryError, RetryPolicy};
