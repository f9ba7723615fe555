//! Exponential backoff for ledger writes, and warning suppression for
//! failures that keep repeating.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Backoff schedule for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Sleep before the first retry, doubled for every later one
    pub initial_delay: Duration,
    /// Upper bound on a single sleep
    pub max_delay: Duration,
    /// What is being retried, for log lines
    pub label: String,
}

impl RetryConfig {
    /// Three retries starting at 200ms, capped at 5s.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            label: label.into(),
        }
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sleep before retry number `retry` (0-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Outcome of `retry_async`.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt failed; `error` is from the last one
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Call `op` until it returns `Ok`, sleeping with exponential backoff between
/// failures, for at most `1 + config.max_retries` calls.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, op: F) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return RetryResult::Success(value),
            Err(err) => err,
        };

        if retries == config.max_retries {
            return RetryResult::Failed {
                error: err,
                attempts: retries + 1,
            };
        }

        let sleep = config.backoff(retries);
        retries += 1;
        warn!(
            "{} failed (attempt {}/{}), next try in {:?}: {}",
            config.label,
            retries,
            config.max_retries + 1,
            sleep,
            err
        );
        tokio::time::sleep(sleep).await;
    }
}

/// Counts back-to-back failures and says which ones are still worth a
/// warning, so a persistent fault such as a full disk under the ledger logs
/// a bounded number of lines.
#[derive(Debug, Default)]
pub struct FailureTracker {
    streak: u32,
    warn_limit: u32,
}

impl FailureTracker {
    pub fn new(warn_limit: u32) -> Self {
        Self {
            streak: 0,
            warn_limit,
        }
    }

    pub fn record_success(&mut self) {
        if self.streak > self.warn_limit {
            debug!("Recovered after {} failures in a row", self.streak);
        }
        self.streak = 0;
    }

    /// Count a failure; `true` while the caller should still log it.
    pub fn record_failure(&mut self) -> bool {
        self.streak += 1;
        if self.streak == self.warn_limit + 1 {
            warn!(
                "{} failures in a row, further ones are not logged until recovery",
                self.warn_limit
            );
        }
        self.streak <= self.warn_limit
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}
