//! Fixed-delay retry policy

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RetryError;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Run an operation up to `attempts` times, sleeping `delay` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl RetryPolicy {
    /// `attempts` below 1 is raised to 1: the operation always runs once.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
    /// or attempts run out. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(error) if attempt >= self.attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, retrying"
                    );
                    metrics::counter!("media_retries_total").increment(1);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
