//! Exponential backoff for explicit sync operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

/// How often, and how patiently, to retry a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackoffPolicy {
    /// Total attempts including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl BackoffPolicy {
    /// Delay slept after the failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// Sleeps `base_delay * 2^n` after the n-th failure (0-based). The last
/// error is returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &BackoffPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_backoff_while(policy, |_| true, op).await
}

/// Like [`retry_with_backoff`], but stops at the first error for which
/// `retryable` returns `false`.
///
/// # Errors
///
/// Returns the first non-retryable error, or the error of the final attempt.
pub async fn retry_with_backoff_while<T, E, R, F, Fut>(
    policy: &BackoffPolicy,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !retryable(&err) => {
                debug!(attempt = attempt + 1, error = %err, "Not retryable");
                return Err(err);
            }
            Err(err) if attempt + 1 >= max_attempts => {
                warn!(attempts = attempt + 1, error = %err, "Giving up after retries");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                debug!(attempt = attempt + 1, ?delay, error = %err, "Retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
