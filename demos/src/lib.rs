//! Shared setup for the demo binaries

use battlemetrics_types::{server_events_channel, Envelope};
use std::env;
use std::time::Duration;
use tracing::info;

/// Install a `RUST_LOG`-driven subscriber (default `info`) with UTC timestamps
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Channels named by the comma-separated `SERVERS` variable
pub fn channels_from_env() -> Vec<String> {
    parse_servers(&env::var("SERVERS").unwrap_or_default())
}

/// Replay window from `BM_REPLAY_WINDOW_SECS`, if set and valid
pub fn replay_window_from_env() -> Option<Duration> {
    env::var("BM_REPLAY_WINDOW_SECS")
        .ok()
        .and_then(|secs| secs.trim().parse().ok())
        .map(Duration::from_secs)
}

fn parse_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(server_events_channel)
        .collect()
}

/// Handler that logs every event
pub fn log_envelope(envelope: Envelope) {
    info!(
        id = %envelope.id,
        kind = %envelope.kind,
        channel = envelope.channel.as_deref().unwrap_or("-"),
        payload = ?envelope.payload,
        "event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_servers() {
        assert_eq!(
            parse_servers("123, 456,,"),
            ["server:events:123", "server:events:456"]
        );
        assert!(parse_servers("").is_empty());
    }
}
