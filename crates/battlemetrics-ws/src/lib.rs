//! Native WebSocket client for the BattleMetrics real-time feed
//!
//! This crate keeps a long-lived subscription to one or more channels,
//! installs server-side filters, and hands every decoded event to an
//! application callback.
//!
//! # Features
//!
//! - Automatic reconnection with jittered backoff (capped at 60s)
//! - Filter, join and replay handshake restored after every reconnect
//! - Replay of missed events when the gap is inside the replay window
//! - Idle-connection detection with a ping heartbeat
//! - Non-blocking, panic-isolated dispatch to the handler
//!
//! # Example
//!
//! ```no_run
//! use battlemetrics_ws::{ClientConfig, RealtimeClient, Subscription};
//! use battlemetrics_types::{server_events_channel, ActivityFilter, Envelope, ACTIVITY_TARGET};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut subscription = Subscription::with_channels([server_events_channel("1234")]);
//!     subscription.filter(
//!         ACTIVITY_TARGET,
//!         ActivityFilter::new().whitelist_types(["addPlayer", "removePlayer"]),
//!     );
//!
//!     let client = RealtimeClient::new(ClientConfig::new(), subscription);
//!
//!     // Runs forever
//!     client
//!         .run(|envelope: Envelope| println!("{:?}", envelope))
//!         .await;
//! }
//! ```

pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod heartbeat;
pub mod reconnect;
pub mod replay;
pub mod session;
pub mod subscription;
pub mod transport;

// Re-export main types
pub use connection::{ClientConfig, ConnectionState, CycleOutcome, RealtimeClient};
pub use dispatcher::{Dispatcher, Handler};
pub use endpoint::Endpoint;
pub use heartbeat::{HeartbeatConfig, Liveness};
pub use reconnect::{Backoff, ReconnectConfig};
pub use replay::{ReplayConfig, ReplayCursor, ReplayReference, ReplayState};
pub use session::{Session, SessionEnd};
pub use subscription::Subscription;
pub use transport::{Socket, Transport, TransportError, WsTransport};
