//! Retry executor: exponential backoff with jitter around a remote call.
//!
//! Attempt `n` (0-based) that fails with a retryable error is followed by a
//! sleep of `base_delay * 2^n + U[0, jitter)`. Fatal errors surface at once
//! without using up the budget. The executor knows nothing about what the
//! operation does; text and image calls go through the same code.

use crate::error::{ServiceError, StepFailure};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

// 2^16 × any sane base delay is already far beyond a useful wait.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Exclusive upper bound of the uniform jitter.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(3),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
    }

    /// Full delay: backoff plus a uniformly drawn jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            self.jitter.mul_f64(rand::random::<f64>())
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

/// Run `operation` under `policy`, retrying while `is_retryable` says so.
///
/// Returns the first success. Otherwise returns a [`StepFailure`] that is
/// `exhausted` when the budget ran out, or not when a fatal error stopped
/// the loop.
pub async fn execute<T, F, Fut, C>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: C,
    mut operation: F,
) -> Result<T, StepFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
    C: Fn(&ServiceError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{label}: succeeded on attempt {}", attempt + 1);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            warn!("{label}: fatal error, not retrying: {err}");
            return Err(StepFailure::fatal(err, attempt + 1));
        }
        if attempt + 1 >= max_attempts {
            warn!("{label}: giving up after {max_attempts} attempts: {err}");
            return Err(StepFailure::exhausted(err, max_attempts));
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "{label}: attempt {}/{} failed ({err}), retrying in {}ms",
            attempt + 1,
            max_attempts,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// [`execute`] with the standard classifier, [`ServiceError::is_retryable`].
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> Result<T, StepFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    execute(policy, label, ServiceError::is_retryable, operation).await
}
