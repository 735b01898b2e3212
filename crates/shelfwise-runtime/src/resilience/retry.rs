//! Retry with exponential backoff, bounded by an optional deadline.
//!
//! Delays grow as `base_delay * 2^(attempt - 1)` and are capped at
//! `max_delay`. Only errors that classify themselves as transient are
//! retried. A deadline bounds both the in-flight attempt and the sleeps
//! between attempts: if the next delay would land past it, we stop early.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::duration_str;

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_retries: u32,

    /// Delay after the first failed attempt
    #[serde(with = "duration_str")]
    pub base_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Stand-in deadline for budgets too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// The instant `budget` from now, saturating instead of overflowing.
pub fn deadline_in(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// How an error should be treated by the retry loop.
pub trait RetryClassify {
    /// Whether another attempt could succeed.
    fn is_transient(&self) -> bool;

    /// Minimum wait the dependency asked for, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Why a retried operation gave up.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("Gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("Permanent failure on attempt {attempts}: {error}")]
    Permanent { attempts: u32, error: E },

    #[error("Deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Permanent { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// The last error the operation returned, if it returned one.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Permanent { error, .. } => Some(error),
            RetryError::DeadlineExceeded { last, .. } => last.as_ref(),
        }
    }
}

/// Retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_retries.max(1)
    }

    /// Delays between attempts, one fewer than the attempt count.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let retries = usize::try_from(self.max_attempts() - 1).unwrap_or(usize::MAX);
        ExponentialBuilder::default()
            .with_min_delay(self.config.base_delay)
            .with_max_delay(self.config.max_delay)
            .with_factor(2.0)
            .with_max_times(retries)
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or hits `deadline`.
    pub async fn run<F, Fut, T, E>(
        &self,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        let max_attempts = self.max_attempts();
        let mut delays = self.delays();
        let mut attempts = 0;
        let mut last: Option<E> = None;

        loop {
            attempts += 1;

            let outcome = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, operation()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(attempts, "Deadline reached during attempt");
                        return Err(RetryError::DeadlineExceeded { attempts, last });
                    }
                },
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::warn!(attempts, error = %error, "Permanent failure, not retrying");
                return Err(RetryError::Permanent { attempts, error });
            }

            if attempts >= max_attempts {
                tracing::warn!(attempts, error = %error, "Retries exhausted");
                return Err(RetryError::Exhausted { attempts, last: error });
            }

            let mut delay = delays.next().unwrap_or(self.config.max_delay);
            if let Some(requested) = error.retry_after() {
                delay = delay.max(requested.min(self.config.max_delay));
            }

            if let Some(deadline) = deadline {
                if deadline.saturating_duration_since(Instant::now()) <= delay {
                    tracing::warn!(
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Next retry would pass the deadline, giving up"
                    );
                    return Err(RetryError::DeadlineExceeded {
                        attempts,
                        last: Some(error),
                    });
                }
            }

            tracing::warn!(
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            last = Some(error);
            tokio::time::sleep(delay).await;
        }
    }
}
