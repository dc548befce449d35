//! Retry with exponential backoff for transient storage failures

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::types::{LedgerError, LedgerResult};

/// Backoff settings for retrying transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Run every operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the given attempt (0-indexed); doubles each time up to
    /// `max_delay_ms`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Whether a failed attempt (0-indexed) should be tried again
    pub fn should_retry(&self, error: &LedgerError, attempt: u32) -> bool {
        error.is_retryable() && attempt + 1 < self.max_attempts
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if policy.should_retry(&err, attempt) => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
