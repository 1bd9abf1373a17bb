//! Connection retry with exponential backoff
//!
//! Only `connect()` is protected by this loop; tool invocation failures are
//! terminal per-call and never pass through here.

use crate::error::BridgeError;
use rand::Rng;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Backoff parameters for connection establishment
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt, seconds (> 0)
    pub base_delay: f64,
    /// Upper bound on any single delay, seconds (>= base_delay)
    pub max_delay: f64,
    /// Growth factor per attempt (> 1)
    pub exponential_base: f64,
    /// Scale each delay by a uniform factor in [0.5, 1.0)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: 1.0,
            max_delay: 60.0,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay after the n-th failed attempt (1-based):
    /// `min(base * exponential_base^(n-1), max)`, jitter-scaled when enabled
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        let mut secs = (self.base_delay * exp).min(self.max_delay);

        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.0);
            secs *= factor;
        }

        Duration::from_secs_f64(secs)
    }
}

/// Observer invoked before each backoff sleep with `(attempt, error, delay)`
pub type RetryObserver<'a> = &'a (dyn Fn(u32, &BridgeError, Duration) + Send + Sync);

/// Run `op` until it succeeds, retrying retryable errors per `policy`.
///
/// The final failure is returned unmodified. Observer panics are swallowed so
/// diagnostics can never abort the loop.
pub async fn retry<F, Fut, T>(
    policy: &RetryPolicy,
    observer: Option<RetryObserver<'_>>,
    op: F,
) -> Result<T, BridgeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || attempt >= max_attempts {
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);

                if let Some(obs) = observer {
                    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        obs(attempt, &error, delay);
                    }));
                }

                warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %error,
                    "retrying after failure"
                );

                sleep(delay).await;
            }
        }
    }

    // max_attempts >= 1 guarantees the loop returns before falling through
    unreachable!("retry loop exited without a result")
}
