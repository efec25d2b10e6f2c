//! Bounded retry with exponential backoff.
//!
//! Every retrying call site in ragline goes through [`RetryPolicy::run`], so
//! attempt counting and delay growth behave the same for the vector store,
//! the embedding service and the language model.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::error::{AppError, AppResult};

/// How many times to try an operation and how long to wait in between.
///
/// The delay before retry `n` (1-based) is `initial_delay * 2^(n-1)`,
/// capped at `max_delay`. No jitter is applied so tests stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Result of an operation that did not succeed under a [`RetryPolicy`].
#[derive(Error, Debug)]
pub enum RetryError {
    /// Every attempt failed with a transient error
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: AppError,
    },

    /// A non-transient error stopped the loop early
    #[error(transparent)]
    Fatal(AppError),
}

impl RetryError {
    /// The error returned by the final attempt.
    pub fn last_error(&self) -> &AppError {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal(err) => err,
        }
    }
}

impl From<RetryError> for AppError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(err) => err,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. Only errors for
    /// which [`AppError::is_transient`] holds are retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => return Err(RetryError::Fatal(err)),
                Err(err) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
