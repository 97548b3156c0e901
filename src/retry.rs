//! Bounded retry for whole pipeline runs.
//!
//! Every attempt re-runs the operation from scratch; nothing from a failed
//! attempt is kept. Only retryable errors (see
//! [`NewsError::is_retryable`]) lead to another attempt.
//!
//! # Backoff
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! A zero `base_delay` disables waiting (and jitter) entirely.

use crate::error::{NewsError, Result};
use rand::{Rng, rng};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

pub const DEFAULT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// No waiting between attempts.
    #[cfg(test)]
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    fn delay_after(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            info!(label, attempt, max = self.max_attempts, "Starting attempt");
            let attempt_t0 = Instant::now();
            let err: NewsError = match op(attempt).await {
                Ok(value) => {
                    info!(
                        label,
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "Attempt succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => e,
            };

            let elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64;
            if !err.is_retryable() || attempt >= self.max_attempts {
                error!(
                    label,
                    attempt,
                    max = self.max_attempts,
                    elapsed_ms_attempt,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %err,
                    "All attempts failed"
                );
                return Err(err);
            }

            let delay = self.delay_after(attempt);
            warn!(
                label,
                attempt,
                max = self.max_attempts,
                elapsed_ms_attempt,
                ?delay,
                error = %err,
                "Attempt failed; retrying from scratch"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}
