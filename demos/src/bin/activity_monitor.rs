//! Demo 2: Activity Monitor
//!
//! Joins every server in `SERVERS` with a server-side filter that only lets
//! player joins and leaves through. Missed events are replayed when the
//! disconnect was shorter than the replay window (5 minutes, or
//! `BM_REPLAY_WINDOW_SECS`).
//!
//! Run: SERVERS=1234 RUST_LOG=debug cargo run --bin activity_monitor

use battlemetrics_demos::{channels_from_env, init_logging, log_envelope, replay_window_from_env};
use battlemetrics_types::{ActivityFilter, TagTypeMode, ACTIVITY_TARGET};
use battlemetrics_ws::{ClientConfig, RealtimeClient, ReplayConfig, Subscription};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    init_logging();

    let mut subscription = Subscription::new();
    subscription.join_all(channels_from_env());
    if subscription.is_empty() {
        error!("SERVERS is empty; nothing to join");
        std::process::exit(2);
    }

    subscription.filter(
        ACTIVITY_TARGET,
        ActivityFilter::new()
            .with_mode(TagTypeMode::And)
            .whitelist_types(["addPlayer", "removePlayer"]),
    );

    let window = replay_window_from_env().unwrap_or(Duration::from_secs(5 * 60));
    info!(channels = ?subscription.channels(), ?window, "Starting activity monitor");

    let config = ClientConfig::new().with_replay(ReplayConfig::new().with_window(window));
    RealtimeClient::new(config, subscription)
        .run(log_envelope)
        .await;
}
