//! Bounded retry and timeouts for store access

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry schedule for retryable errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff (doubles each retry)
    pub initial_backoff_ms: u64,
    /// Maximum backoff
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.backoff_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Retrying after {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                if attempt > 0 {
                    debug!(operation, attempts = attempt + 1, "Giving up");
                }
                return Err(e);
            }
        }
    }
}

/// Bound a future by `timeout`, failing with [`Error::Timeout`]
pub async fn with_timeout<T, Fut>(timeout: Duration, operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = timeout.as_millis() as u64, "Operation timed out");
            Err(Error::timeout(operation, timeout.as_millis() as u64))
        }
    }
}
