use std::future::Future;
use std::time::Duration;
use tradehub_core::constants::{DEFAULT_FETCH_BACKOFF_MS, DEFAULT_FETCH_MAX_ATTEMPTS};
use tradehub_core::{AppError, AppResult, Config, ErrorMetadata};

/// Bounded retries with a linearly growing delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_FETCH_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.fetch_max_attempts, config.fetch_backoff())
    }

    /// Delay after the failed attempt `attempt` (1-based): `attempt * base_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `operation` until it succeeds, fails with a non-recoverable error
    /// or runs out of attempts.
    ///
    /// Running out of attempts yields [`AppError::RetriesExhausted`] wrapping
    /// the last error.
    pub async fn run<T, F, Fut>(&self, key: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    tracing::warn!(
                        key = %key,
                        attempts = attempt,
                        error = %e,
                        "Giving up after repeated failures"
                    );
                    return Err(AppError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::info!(
                        key = %key,
                        attempt = attempt,
                        delay_ms = duration_millis(delay),
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
