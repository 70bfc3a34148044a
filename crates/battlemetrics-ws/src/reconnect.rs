//! Reconnection backoff
//!
//! The delay starts at zero, the supervisor sleeps for the current delay after
//! every finished attempt and then grows it by a random whole-second step.
//! A successful dial resets it to zero.

use rand::Rng;
use std::time::Duration;

/// Configuration for the reconnection backoff
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Smallest growth step
    pub step_base: Duration,
    /// Number of whole seconds of random jitter added to each step (exclusive bound)
    pub step_spread_secs: u64,
    /// Maximum delay between reconnection attempts
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            step_base: Duration::from_secs(5),
            step_spread_secs: 6,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the smallest growth step
    pub fn with_step_base(mut self, step: Duration) -> Self {
        self.step_base = step;
        self
    }

    /// Set the jitter spread in whole seconds
    pub fn with_step_spread(mut self, secs: u64) -> Self {
        self.step_spread_secs = secs;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Draw one growth step
    pub fn step(&self) -> Duration {
        let jitter = if self.step_spread_secs == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.step_spread_secs)
        };
        self.step_base + Duration::from_secs(jitter)
    }
}

/// Mutable backoff state carried across reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
}

impl Backoff {
    /// Create a backoff starting at zero
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            delay: Duration::ZERO,
        }
    }

    /// Delay the next sleep will use
    pub fn current(&self) -> Duration {
        self.delay
    }

    /// Reset to zero after a successful dial
    pub fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }

    /// Grow the delay by one step, capped at the maximum
    pub fn advance(&mut self) -> Duration {
        self.delay = (self.delay + self.config.step()).min(self.config.max_delay);
        self.delay
    }

    /// Sleep for the current delay, then grow it
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.delay).await;
        self.advance();
    }
}
