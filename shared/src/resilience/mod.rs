pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};

use crate::error::ServiceError;
use crate::models::ServiceName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

/// Policy sets keyed by logical service name, as read from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResilienceSettings {
    pub services: HashMap<ServiceName, ResilienceConfig>,
}

impl ResilienceSettings {
    pub fn for_service(&self, service: ServiceName) -> ResilienceConfig {
        self.services.get(&service).cloned().unwrap_or_default()
    }
}

/// Rate limiter, then circuit breaker, then retry around one remote capability.
pub struct ResiliencePolicy {
    service: ServiceName,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl ResiliencePolicy {
    pub fn new(service: ServiceName, config: ResilienceConfig) -> Self {
        Self {
            service,
            rate_limiter: RateLimiter::new(service.as_str(), config.rate_limiter),
            circuit_breaker: CircuitBreaker::new(service, config.circuit_breaker),
            retry: RetryPolicy::new(service, config.retry),
        }
    }

    pub fn service(&self) -> ServiceName {
        self.service
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Runs the full policy chain without a fallback.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.rate_limiter.try_acquire().await {
            return Err(ServiceError::RateLimited(self.service));
        }
        self.circuit_breaker
            .call(|| self.retry.run(operation))
            .await
    }

    /// Rate limiter and circuit breaker only. For operations that are not
    /// idempotent and must never be re-sent.
    pub async fn execute_once<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.rate_limiter.try_acquire().await {
            return Err(ServiceError::RateLimited(self.service));
        }
        self.circuit_breaker.call(operation).await
    }

    /// Runs the policy chain; infrastructure failures are replaced by `fallback()`.
    pub async fn execute_or_else<T, F, Fut, D>(&self, operation: F, fallback: D) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        D: FnOnce() -> T,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_infrastructure() => {
                warn!(service = %self.service, error = %err, "Remote call degraded, using fallback");
                Ok(fallback())
            }
            Err(err) => Err(err),
        }
    }

    /// Fallback of "nothing": the value is optional in the caller's read-model.
    pub async fn execute_optional<T, F, Fut>(&self, mut operation: F) -> Result<Option<T>, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.execute_or_else(
            || {
                let call = operation();
                async move { call.await.map(Some) }
            },
            || None,
        )
        .await
    }
}

/// One independently configured policy set per remote capability.
pub struct PolicyRegistry {
    concert: ResiliencePolicy,
    venue: ResiliencePolicy,
    reservation: ResiliencePolicy,
    ticket: ResiliencePolicy,
}

impl PolicyRegistry {
    pub fn new(settings: &ResilienceSettings) -> Self {
        let build = |service| ResiliencePolicy::new(service, settings.for_service(service));
        Self {
            concert: build(ServiceName::Concert),
            venue: build(ServiceName::Venue),
            reservation: build(ServiceName::Reservation),
            ticket: build(ServiceName::Ticket),
        }
    }

    pub fn shared(settings: &ResilienceSettings) -> Arc<Self> {
        Arc::new(Self::new(settings))
    }

    pub fn policy(&self, service: ServiceName) -> &ResiliencePolicy {
        match service {
            ServiceName::Concert => &self.concert,
            ServiceName::Venue => &self.venue,
            ServiceName::Reservation => &self.reservation,
            ServiceName::Ticket => &self.ticket,
        }
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(&ResilienceSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(window: usize, attempts: u32, limit: u32) -> ResilienceConfig {
        ResilienceConfig {
            rate_limiter: RateLimiterConfig {
                limit_for_period: limit,
                refresh_period_ms: 60_000,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_rate_threshold: 0.5,
                sliding_window_size: window,
                minimum_number_of_calls: window,
                wait_duration_in_open_state_ms: 10_000,
                permitted_calls_in_half_open_state: 1,
            },
            retry: RetryConfig {
                max_attempts: attempts,
                initial_backoff_ms: 10,
                backoff_multiplier: 2.0,
                max_backoff_ms: 50,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_call_never_reaches_the_network() {
        let policy = ResiliencePolicy::new(ServiceName::Venue, config(5, 1, 1));
        let calls = AtomicU32::new(0);

        let first = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;
        let second = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Err(ServiceError::RateLimited(ServiceName::Venue)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn three_timeouts_open_the_breaker_and_fourth_call_fails_fast() {
        let policy = ResiliencePolicy::new(ServiceName::Concert, config(3, 1, 100));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result: Result<(), _> = policy
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::transient("request timed out"))
                })
                .await;
            assert!(result.unwrap_err().is_transient());
        }

        let fourth: Result<(), _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(fourth, Err(ServiceError::CircuitOpen(ServiceName::Concert)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_counts_one_failure_per_retried_call() {
        let policy = ResiliencePolicy::new(ServiceName::Concert, config(2, 3, 100));
        let calls = AtomicU32::new(0);

        let _: Result<(), _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::transient("503"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(policy.circuit_breaker().state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_replaces_infrastructure_failures_only() {
        let policy = ResiliencePolicy::new(ServiceName::Venue, config(5, 2, 100));

        let degraded = policy
            .execute_or_else(|| async { Err(ServiceError::transient("down")) }, || -1)
            .await;
        assert_eq!(degraded, Ok(-1));

        let missing = policy
            .execute_or_else(|| async { Err::<i32, _>(ServiceError::not_found("venue", 3)) }, || -1)
            .await;
        assert_eq!(missing, Err(ServiceError::not_found("venue", 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn optional_fallback_yields_none() {
        let policy = ResiliencePolicy::new(ServiceName::Venue, config(5, 1, 0));

        let result = policy.execute_optional(|| async { Ok(5) }).await;

        assert_eq!(result, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_once_does_not_retry() {
        let policy = ResiliencePolicy::new(ServiceName::Reservation, config(5, 5, 100));
        let calls = AtomicU32::new(0);

        let result: Result<bool, _> = policy
            .execute_once(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::transient("timeout"))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn settings_parse_per_service_with_defaults() {
        let settings: ResilienceSettings = serde_json::from_str(
            r#"{
                "concert": { "circuit_breaker": { "sliding_window_size": 3 } },
                "venue": { "retry": { "max_attempts": 5 } }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.for_service(ServiceName::Concert).circuit_breaker.sliding_window_size, 3);
        assert_eq!(settings.for_service(ServiceName::Concert).retry.max_attempts, 3);
        assert_eq!(settings.for_service(ServiceName::Venue).retry.max_attempts, 5);
        assert_eq!(settings.for_service(ServiceName::Ticket).rate_limiter.limit_for_period, 50);
    }

    #[test]
    fn registry_keeps_policies_apart() {
        let registry = PolicyRegistry::default();
        assert_eq!(registry.policy(ServiceName::Ticket).service(), ServiceName::Ticket);
        assert_eq!(registry.policy(ServiceName::Venue).service(), ServiceName::Venue);
    }
}
