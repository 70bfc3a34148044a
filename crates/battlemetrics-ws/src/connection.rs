//! WebSocket connection supervision
//!
//! [`RealtimeClient::run`] dials, hands the socket to a [`Session`], and after
//! the session ends (or the dial fails) sleeps for the current backoff before
//! trying again. It never returns.

use crate::dispatcher::{Dispatcher, Handler};
use crate::endpoint::Endpoint;
use crate::heartbeat::HeartbeatConfig;
use crate::reconnect::{Backoff, ReconnectConfig};
use crate::replay::{ReplayConfig, ReplayState};
use crate::session::{Session, SessionEnd, DEFAULT_OUTBOUND_CAPACITY};
use crate::subscription::Subscription;
use crate::transport::{Transport, WsTransport};

use battlemetrics_types::RealtimeError;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connected and running a session
    Connected,
    /// Waiting before the next dial
    Reconnecting {
        /// Backoff delay being slept
        delay: Duration,
    },
}

/// Configuration for the WebSocket connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint
    pub endpoint: Endpoint,
    /// Reconnection backoff
    pub reconnect: ReconnectConfig,
    /// Idle detection
    pub heartbeat: HeartbeatConfig,
    /// Replay gating
    pub replay: ReplayConfig,
    /// Dial timeout (`None` leaves it to the transport)
    pub connect_timeout: Option<Duration>,
    /// Outbound queue capacity
    pub outbound_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Production,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            replay: ReplayConfig::default(),
            connect_timeout: None,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set reconnection config
    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Set heartbeat timing
    pub fn with_heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = config;
        self
    }

    /// Set replay gating
    pub fn with_replay(mut self, config: ReplayConfig) -> Self {
        self.replay = config;
        self
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set outbound queue capacity
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}

/// Result of one dial-and-session cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// The dial failed; no session ran
    DialFailed(RealtimeError),
    /// The dial succeeded but the handshake could not be written
    HandshakeFailed(RealtimeError),
    /// A session ran and ended
    SessionEnded(SessionEnd),
}

/// Reconnecting client for the real-time feed
pub struct RealtimeClient<T: Transport = WsTransport> {
    config: ClientConfig,
    subscription: Subscription,
    transport: T,
    backoff: Backoff,
    replay: ReplayState,
    state_tx: watch::Sender<ConnectionState>,
}

impl RealtimeClient<WsTransport> {
    /// Create a client for the configured endpoint
    pub fn new(config: ClientConfig, subscription: Subscription) -> Self {
        let mut transport = WsTransport::new(config.endpoint.url());
        if let Some(timeout) = config.connect_timeout {
            transport = transport.with_timeout(timeout);
        }
        Self::with_transport(config, subscription, transport)
    }
}

impl<T: Transport> RealtimeClient<T> {
    /// Create a client over a custom transport
    pub fn with_transport(config: ClientConfig, subscription: Subscription, transport: T) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            backoff: Backoff::new(config.reconnect.clone()),
            config,
            subscription,
            transport,
            replay: ReplayState::new(),
            state_tx,
        }
    }

    /// Channels and filters sent on every connection
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Replay cursor carried across reconnects
    pub fn replay_state(&self) -> &ReplayState {
        &self.replay
    }

    /// Current backoff state
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Dial once and, if that succeeds, run a session until it ends
    pub async fn run_cycle(&mut self, dispatcher: &Dispatcher) -> CycleOutcome {
        let url = self.transport.endpoint().to_string();
        info!("Connecting to {}", url);
        self.state_tx.send_replace(ConnectionState::Connecting);

        let socket = match self.transport.connect().await {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, "dial: {}", url);
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return CycleOutcome::DialFailed(RealtimeError::ConnectionFailed {
                    url,
                    reason: e.to_string(),
                });
            }
        };

        self.backoff.reset();
        self.state_tx.send_replace(ConnectionState::Connected);
        info!(channels = self.subscription.channels().len(), "Connected to {}", url);

        let session = Session::new(&self.subscription, dispatcher)
            .with_heartbeat(self.config.heartbeat)
            .with_replay(self.config.replay)
            .with_outbound_capacity(self.config.outbound_capacity);

        let outcome = match session.run(socket, &mut self.replay).await {
            Ok(end) => {
                warn!(reason = %end, "Session ended");
                CycleOutcome::SessionEnded(end)
            }
            Err(e) => {
                warn!(error = %e, "Handshake failed");
                CycleOutcome::HandshakeFailed(e)
            }
        };

        self.state_tx.send_replace(ConnectionState::Disconnected);
        outcome
    }

    /// Sleep for the current backoff delay, then grow it
    pub async fn backoff_sleep(&mut self) {
        let delay = self.backoff.current();
        self.state_tx
            .send_replace(ConnectionState::Reconnecting { delay });
        if !delay.is_zero() {
            info!("Reconnecting in {:?}", delay);
        }
        self.backoff.wait().await;
    }

    /// Deliver envelopes to `handler` forever, reconnecting as needed
    pub async fn run(mut self, handler: impl Handler) -> Infallible {
        let dispatcher = Dispatcher::new(handler);
        loop {
            self.run_cycle(&dispatcher).await;
            self.backoff_sleep().await;
        }
    }
}
