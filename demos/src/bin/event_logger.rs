//! Demo 1: Event Logger
//!
//! Joins every server in `SERVERS`, replays whatever was missed during a
//! disconnect no matter how long it lasted, and logs each event.
//!
//! Run: SERVERS=1234,5678 cargo run --bin event_logger

use battlemetrics_demos::{channels_from_env, init_logging, log_envelope};
use battlemetrics_ws::{ClientConfig, RealtimeClient, ReplayConfig, Subscription};
use tracing::error;

#[tokio::main]
async fn main() {
    init_logging();

    let channels = channels_from_env();
    if channels.is_empty() {
        error!("SERVERS is empty; nothing to join");
        std::process::exit(2);
    }

    let config = ClientConfig::new().with_replay(ReplayConfig::always());
    let client = RealtimeClient::new(config, Subscription::with_channels(channels));

    client.run(log_envelope).await;
}
