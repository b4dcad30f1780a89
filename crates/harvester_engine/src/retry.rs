use std::time::Duration;

use engine_logging::engine_warn;

use crate::{FetchError, FetchOutput, Fetcher, PageRequest};

/// Bounded retry with exponential backoff, applied to transient failures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub async fn fetch(
        &self,
        fetcher: &dyn Fetcher,
        request: &PageRequest,
    ) -> Result<FetchOutput, FetchError> {
        let mut attempt = 1;
        loop {
            match fetcher.fetch(request).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    engine_warn!(
                        "attempt {}/{} for {} failed ({}); retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        request.url(),
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
