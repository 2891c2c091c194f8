use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub limit_for_period: u32,
    pub refresh_period_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 50,
            refresh_period_ms: 1_000,
        }
    }
}

impl RateLimiterConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }
}

struct Window {
    started: Instant,
    admitted: u32,
}

pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            window: Mutex::new(Window {
                started: Instant::now(),
                admitted: 0,
            }),
        }
    }

    /// Admits one call if the current window still has room. Never waits.
    pub async fn try_acquire(&self) -> bool {
        let mut window = self.window.lock().await;

        let now = Instant::now();
        if now.duration_since(window.started) >= self.config.refresh_period() {
            window.started = now;
            window.admitted = 0;
        }

        if window.admitted < self.config.limit_for_period {
            window.admitted += 1;
            true
        } else {
            warn!(
                limiter = %self.name,
                limit = self.config.limit_for_period,
                "Rate limit exceeded, rejecting call"
            );
            false
        }
    }
}
