//! Subscription management
//!
//! A [`Subscription`] is everything the server must be told after each dial:
//! the filters (in registration order) and the channels to join.

use battlemetrics_types::{ActivityFilter, Envelope, RealtimeResult};

use crate::replay::ReplayCursor;

/// Channels and filters restored on every connection
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    channels: Vec<String>,
    filters: Vec<(String, ActivityFilter)>,
}

impl Subscription {
    /// Create an empty subscription
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscription for the given channels
    pub fn with_channels(channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut sub = Self::new();
        sub.join_all(channels);
        sub
    }

    /// Add a channel; returns false if it was already present
    pub fn join(&mut self, channel: impl Into<String>) -> bool {
        let channel = channel.into();
        if self.channels.contains(&channel) {
            return false;
        }
        self.channels.push(channel);
        true
    }

    /// Add several channels
    pub fn join_all(&mut self, channels: impl IntoIterator<Item = impl Into<String>>) {
        for channel in channels {
            self.join(channel);
        }
    }

    /// Set the filter for a target, replacing any earlier one in place
    pub fn filter(&mut self, target: impl Into<String>, filter: ActivityFilter) {
        let target = target.into();
        match self.filters.iter_mut().find(|(t, _)| *t == target) {
            Some((_, existing)) => *existing = filter,
            None => self.filters.push((target, filter)),
        }
    }

    /// Joined channels in join order
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Filters in registration order
    pub fn filters(&self) -> &[(String, ActivityFilter)] {
        &self.filters
    }

    /// Check if no channel has been joined
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Envelopes to send right after dialing: filters, join, then replay
    pub fn handshake(&self, replay_from: Option<&ReplayCursor>) -> RealtimeResult<Vec<Envelope>> {
        let mut envelopes = Vec::with_capacity(self.filters.len() + 2);

        for (target, filter) in &self.filters {
            envelopes.push(Envelope::filter(target.as_str(), filter)?);
        }

        envelopes.push(Envelope::join(&self.channels));

        if let Some(cursor) = replay_from {
            envelopes.push(Envelope::replay(&self.channels, cursor.id.as_str())?);
        }

        Ok(envelopes)
    }
}
