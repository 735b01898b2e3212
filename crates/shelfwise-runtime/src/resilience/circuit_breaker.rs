//! Circuit breaker guarding a remote dependency.
//!
//! After `failure_threshold` consecutive failures the circuit opens and
//! calls are rejected without touching the dependency. Once the reset
//! timeout has elapsed a single probe call is let through: success closes
//! the circuit, failure opens it again.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::duration_str;

/// Circuit breaker configuration. Fields left out of a config file take
/// their [`recommendations`](Self::recommendations) values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default = "CircuitBreakerConfig::recommendations")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed
    #[serde(with = "duration_str")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Profile for the recommendation provider. Recommendations are
    /// best-effort, so the breaker trips sooner and recovers sooner.
    pub fn recommendations() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Calls are rejected until the reset timeout elapses
    Open,

    /// One probe call decides whether to close
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from a guarded call.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Rejected without calling the dependency
    #[error("Circuit breaker is OPEN for {dependency}")]
    Open {
        dependency: String,
        retry_in: Option<Duration>,
    },

    /// The dependency was called and failed
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub time_since_last_failure_ms: Option<u64>,
    /// Time until a probe is allowed; only set while OPEN
    pub next_retry_in_ms: Option<u64>,
}

impl BreakerSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.state == CircuitState::Closed
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_at: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker for one dependency.
///
/// The lock is never held across an await; the guarded operation runs
/// outside it.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// While OPEN the operation is not invoked and `BreakerError::Open` is
    /// returned. Any `Err` from the operation counts as one failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _probe = self.admit()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Decide whether a call may proceed, moving OPEN to HALF_OPEN when the
    /// reset timeout has elapsed.
    fn admit<E>(&self) -> Result<Option<ProbeGuard<'_>>, BreakerError<E>> {
        let mut inner = self.state.write();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(None),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);

                if elapsed > self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(
                        dependency = %self.name,
                        failures = inner.failure_count,
                        "Circuit half-open, sending recovery probe"
                    );
                    Ok(Some(ProbeGuard { breaker: self }))
                } else {
                    tracing::debug!(dependency = %self.name, "Circuit open, rejecting call");
                    Err(BreakerError::Open {
                        dependency: self.name.clone(),
                        retry_in: Some(self.config.reset_timeout.saturating_sub(elapsed)),
                    })
                }
            }
            CircuitState::HalfOpen if inner.probe_in_flight => Err(BreakerError::Open {
                dependency: self.name.clone(),
                retry_in: None,
            }),
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(Some(ProbeGuard { breaker: self }))
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&self) {
        let mut inner = self.state.write();
        if inner.state != CircuitState::Closed {
            tracing::info!(
                dependency = %self.name,
                from = %inner.state,
                "Circuit closed after successful call"
            );
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    /// Record a failed call.
    pub fn on_failure(&self) {
        let mut inner = self.state.write();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        if inner.failure_count < self.config.failure_threshold {
            tracing::debug!(
                dependency = %self.name,
                failures = inner.failure_count,
                threshold = self.config.failure_threshold,
                "Recorded dependency failure"
            );
            return;
        }

        match inner.state {
            CircuitState::Closed => tracing::warn!(
                dependency = %self.name,
                failures = inner.failure_count,
                "Circuit opened after repeated failures"
            ),
            CircuitState::HalfOpen => tracing::warn!(
                dependency = %self.name,
                failures = inner.failure_count,
                "Circuit reopened after failed recovery probe"
            ),
            CircuitState::Open => {}
        }
        inner.state = CircuitState::Open;
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state.read().state
    }

    /// Consecutive failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.state.read().failure_count
    }

    /// Snapshot for status reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.state.read();
        let since = inner.last_failure.map(|t| t.elapsed());
        let next_retry_in = match (inner.state, since) {
            (CircuitState::Open, Some(since)) => {
                Some(self.config.reset_timeout.saturating_sub(since))
            }
            _ => None,
        };

        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            reset_timeout_ms: millis(self.config.reset_timeout),
            last_failure_time: inner.last_failure_at,
            time_since_last_failure_ms: since.map(millis),
            next_retry_in_ms: next_retry_in.map(millis),
        }
    }

    /// Reset to closed.
    pub fn reset(&self) {
        *self.state.write() = BreakerState::closed();
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Marks the HALF_OPEN probe as finished when dropped, including when the
/// probe future is cancelled.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.breaker.state.write().probe_in_flight = false;
    }
}
