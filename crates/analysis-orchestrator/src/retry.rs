use std::future::Future;
use std::time::Duration;

use analysis_core::AnalysisError;
use serde::{Deserialize, Serialize};

/// Bounded retry with exponential backoff and a per-attempt deadline
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    ///
    /// Timeouts surface as `MarketDataUnavailable`. Errors that are not
    /// transient are returned at once.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => AnalysisError::MarketDataUnavailable(format!(
                    "{} timed out after {}ms",
                    what,
                    self.attempt_timeout.as_millis()
                )),
            };

            if attempt >= attempts {
                tracing::warn!("{} failed after {} attempts: {}", what, attempts, error);
                return Err(error);
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                "{} failed (attempt {}/{}): {}; retrying in {}ms",
                what,
                attempt,
                attempts,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
