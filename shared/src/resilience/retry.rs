use crate::error::ServiceError;
use crate::models::ServiceName;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    service: ServiceName,
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(service: ServiceName, config: RetryConfig) -> Self {
        Self { service, config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Backoff before retry number `retry` (1-based), capped and jittered into
    /// `[0.5, 1.0]` of the exponential value.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.config.initial_backoff_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        let capped = base.min(self.config.max_backoff_ms as f64).max(0.0);
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_millis((capped * jitter) as u64)
    }

    /// Only transient faults are retried.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts() => {
                    let delay = self.delay_for_retry(attempt);
                    warn!(
                        service = %self.service,
                        attempt,
                        max_attempts = self.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
