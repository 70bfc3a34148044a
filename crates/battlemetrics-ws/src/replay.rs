//! Missed-message replay bookkeeping
//!
//! The cursor survives reconnects but lives in memory only, so a process
//! restart always resumes live.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Timestamp the replay window is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayReference {
    /// Time the last non-ack envelope was received
    #[default]
    LastMessage,
    /// Time of the previous successful dial
    LastConnect,
}

/// Replay gating configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Replay only if the reference is younger than this (`None` = always)
    pub window: Option<Duration>,
    /// Timestamp the window is measured from
    pub reference: ReplayReference,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            window: Some(Duration::from_secs(5 * 60)),
            reference: ReplayReference::LastMessage,
        }
    }
}

impl ReplayConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay whenever a cursor exists, regardless of age
    pub fn always() -> Self {
        Self {
            window: None,
            ..Self::default()
        }
    }

    /// Set the replay window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the reference timestamp
    pub fn with_reference(mut self, reference: ReplayReference) -> Self {
        self.reference = reference;
        self
    }
}

/// Last non-ack envelope seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCursor {
    /// Envelope id to replay from
    pub id: String,
    /// Monotonic receive time, used for gating
    pub received_at: Instant,
    /// Wall-clock receive time, used for logging
    pub received_wall: DateTime<Utc>,
}

/// Replay state carried across reconnects
#[derive(Debug, Default, Clone)]
pub struct ReplayState {
    cursor: Option<ReplayCursor>,
    last_connect: Option<Instant>,
}

impl ReplayState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Last non-ack envelope seen, if any
    pub fn cursor(&self) -> Option<&ReplayCursor> {
        self.cursor.as_ref()
    }

    /// Record a non-ack envelope
    pub fn record(&mut self, id: impl Into<String>, now: Instant) {
        self.cursor = Some(ReplayCursor {
            id: id.into(),
            received_at: now,
            received_wall: Utc::now(),
        });
    }

    /// Time of the previous successful dial
    pub fn last_connect(&self) -> Option<Instant> {
        self.last_connect
    }

    /// Record a successful dial
    ///
    /// Call after [`replay_start`](Self::replay_start) so `LastConnect`
    /// gating sees the previous connection, not this one.
    pub fn connected(&mut self, now: Instant) {
        self.last_connect = Some(now);
    }

    /// Id to replay from on this connection, if replay is allowed
    pub fn replay_start(&self, config: &ReplayConfig, now: Instant) -> Option<&ReplayCursor> {
        let cursor = self.cursor.as_ref().filter(|c| !c.id.is_empty())?;

        let Some(window) = config.window else {
            return Some(cursor);
        };

        let reference = match config.reference {
            ReplayReference::LastMessage => Some(cursor.received_at),
            ReplayReference::LastConnect => self.last_connect,
        }?;

        (now.saturating_duration_since(reference) < window).then_some(cursor)
    }
}
