//! Idle-connection detection
//!
//! The receive pump stamps [`Liveness`] on every inbound envelope, acks
//! included. The heartbeat monitor reads it once per tick and declares the
//! connection dead when nothing arrived within the timeout.

use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// Shortest tick the monitor will run with
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between liveness checks (and pings)
    pub interval: Duration,
    /// Maximum silence before the connection is considered dead
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval (at least one millisecond)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the silence timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tick period actually used by the monitor
    pub(crate) fn period(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }
}

/// Timestamp of the most recent inbound envelope
///
/// Single writer (receive pump), single reader (heartbeat monitor).
#[derive(Debug)]
pub struct Liveness {
    last_activity: RwLock<Instant>,
}

impl Liveness {
    /// Start tracking from `now`
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity: RwLock::new(now),
        }
    }

    /// Record inbound activity
    pub fn touch(&self, now: Instant) {
        *self.last_activity.write() = now;
    }

    /// Most recent inbound activity
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.read()
    }

    /// Check if the silence since the last activity exceeds `timeout`
    ///
    /// A timeout too large to represent as a deadline never expires.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_activity().checked_add(timeout) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_expiry_is_strict() {
        let start = Instant::now();
        let liveness = Liveness::new(start);
        let timeout = Duration::from_secs(60);

        assert!(!liveness.is_expired(start + timeout, timeout));
        assert!(liveness.is_expired(start + timeout + Duration::from_millis(1), timeout));
    }

    #[test]
    fn test_touch_extends_window() {
        let start = Instant::now();
        let liveness = Liveness::new(start);
        let timeout = Duration::from_secs(60);

        liveness.touch(start + Duration::from_secs(50));
        assert_eq!(liveness.last_activity(), start + Duration::from_secs(50));
        assert!(!liveness.is_expired(start + Duration::from_secs(90), timeout));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = HeartbeatConfig::new().with_interval(Duration::ZERO);
        assert_eq!(config.interval, MIN_INTERVAL);

        let raw = HeartbeatConfig {
            interval: Duration::ZERO,
            ..HeartbeatConfig::default()
        };
        assert_eq!(raw.period(), MIN_INTERVAL);
    }

    #[test]
    fn test_huge_timeout_never_expires() {
        let start = Instant::now();
        let liveness = Liveness::new(start);

        assert!(!liveness.is_expired(start + Duration::from_secs(3600), Duration::MAX));
    }
}
