use crate::error::ServiceError;
use crate::models::ServiceName;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure ratio in `0.0..=1.0` at which the breaker opens.
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_number_of_calls: usize,
    pub wait_duration_in_open_state_ms: u64,
    pub permitted_calls_in_half_open_state: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 10,
            minimum_number_of_calls: 5,
            wait_duration_in_open_state_ms: 30_000,
            permitted_calls_in_half_open_state: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_duration_in_open_state_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { admitted: usize, succeeded: usize },
}

#[derive(Debug)]
struct BreakerState {
    phase: Phase,
    // true = failure
    window: VecDeque<bool>,
}

enum Outcome {
    Success,
    Failure,
    Ignored,
}

pub struct CircuitBreaker {
    service: ServiceName,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(service: ServiceName, mut config: CircuitBreakerConfig) -> Self {
        let window_size = config.sliding_window_size.max(1);
        let minimum_calls = config.minimum_number_of_calls.clamp(1, window_size);
        if window_size != config.sliding_window_size || minimum_calls != config.minimum_number_of_calls {
            warn!(
                service = %service,
                sliding_window_size = window_size,
                minimum_number_of_calls = minimum_calls,
                "Circuit breaker config adjusted"
            );
        }
        config.sliding_window_size = window_size;
        config.minimum_number_of_calls = minimum_calls;

        let window = VecDeque::with_capacity(window_size);
        Self {
            service,
            config,
            state: Mutex::new(BreakerState {
                phase: Phase::Closed,
                window,
            }),
        }
    }

    pub async fn state(&self) -> CircuitState {
        let state = self.state.lock().await;
        match state.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Runs `operation` if the breaker permits it. Only transient faults count as failures.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.try_acquire_permission().await {
            warn!(service = %self.service, "Circuit breaker is OPEN, rejecting call");
            return Err(ServiceError::CircuitOpen(self.service));
        }

        let result = operation().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_transient() => Outcome::Failure,
            Err(_) => Outcome::Ignored,
        };
        self.record(outcome).await;
        result
    }

    async fn try_acquire_permission(&self) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        match state.phase {
            Phase::Closed => true,
            Phase::Open { since } => {
                if since.elapsed() >= self.config.wait_duration() {
                    info!(service = %self.service, "Circuit breaker transitioning OPEN -> HALF_OPEN");
                    state.phase = Phase::HalfOpen {
                        admitted: 1,
                        succeeded: 0,
                    };
                    true
                } else {
                    false
                }
            }
            Phase::HalfOpen {
                ref mut admitted, ..
            } => {
                if *admitted < self.config.permitted_calls_in_half_open_state {
                    *admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn record(&self, outcome: Outcome) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        match state.phase {
            Phase::Closed => {
                let failed = match outcome {
                    Outcome::Success => false,
                    Outcome::Failure => true,
                    Outcome::Ignored => return,
                };
                if state.window.len() == self.config.sliding_window_size {
                    state.window.pop_front();
                }
                state.window.push_back(failed);

                let calls = state.window.len();
                let failures = state.window.iter().filter(|f| **f).count();
                let ratio = failures as f64 / calls as f64;
                if calls >= self.config.minimum_number_of_calls
                    && ratio >= self.config.failure_rate_threshold
                {
                    warn!(
                        service = %self.service,
                        failures,
                        calls,
                        "Circuit breaker transitioning CLOSED -> OPEN"
                    );
                    state.phase = Phase::Open {
                        since: Instant::now(),
                    };
                    state.window.clear();
                }
            }
            Phase::HalfOpen {
                ref mut admitted,
                ref mut succeeded,
            } => match outcome {
                Outcome::Success => {
                    *succeeded += 1;
                    if *succeeded >= self.config.permitted_calls_in_half_open_state {
                        info!(service = %self.service, "Circuit breaker transitioning HALF_OPEN -> CLOSED");
                        state.phase = Phase::Closed;
                        state.window.clear();
                    }
                }
                Outcome::Failure => {
                    warn!(service = %self.service, "Circuit breaker transitioning HALF_OPEN -> OPEN (recovery failed)");
                    state.phase = Phase::Open {
                        since: Instant::now(),
                    };
                }
                Outcome::Ignored => {
                    *admitted = admitted.saturating_sub(1);
                }
            },
            // A call admitted before the breaker opened finished late.
            Phase::Open { .. } => {}
        }
    }
}
