//! Explicit retry policy passed to call sites that need resilience.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    Exponential { initial: Duration, factor: u32 },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, factor } => {
                let exp = attempt.saturating_sub(1);
                initial.saturating_mul(factor.saturating_pow(exp))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; 0 is treated as 1
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }

    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(retries: u32, initial: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            backoff: Backoff::Exponential { initial, factor: 2 },
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    /// Intermediate errors are logged; the last one is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max => {
                    let wait = self.backoff.delay_after(attempt);
                    warn!(attempt = attempt, max_attempts = max, delay_ms = wait.as_millis() as u64, error = %e, "Attempt failed, retrying");
                    super::delay(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
