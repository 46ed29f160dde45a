//! Bounded exponential backoff for storage calls
//!
//! Only [`QueryError::NetworkTransient`] is retried. Authorization and
//! not-found failures surface on the first attempt.

use callscope_core::{QueryConfig, QueryError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy for storage queries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub cap: Duration,
}

impl RetryPolicy {
    /// Build from configuration
    #[must_use]
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.base_delay_ms),
            factor: config.factor,
            jitter: config.jitter,
            cap: Duration::from_millis(config.cap_ms),
        }
    }

    /// Single attempt, no backoff
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based; attempt 0 has no delay)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = f64::from(attempt - 1);
        let mut delay_ms = self.base.as_millis() as f64 * self.factor.powf(exp);
        delay_ms = delay_ms.min(self.cap.as_millis() as f64);
        if self.jitter > 0.0 {
            let jitter = rand::rng().random_range(-self.jitter..self.jitter);
            delay_ms *= 1.0 + jitter;
        }
        Duration::from_millis(delay_ms.max(0.0).round() as u64)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        op = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}
