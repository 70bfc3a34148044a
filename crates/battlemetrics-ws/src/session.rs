//! One physical connection, from handshake to teardown
//!
//! After the handshake three pumps run concurrently on the session's task:
//!
//! - the receive pump reads and decodes frames, stamps liveness, records the
//!   replay cursor and hands non-ack envelopes to the [`Dispatcher`];
//! - the send pump drains the outbound queue into the socket;
//! - the heartbeat monitor pings an idle queue and ends the session when the
//!   server has been silent for too long.
//!
//! Whichever pump finishes first decides the [`SessionEnd`]; the others are
//! dropped and the socket is closed.

use battlemetrics_types::{Envelope, RealtimeError, RealtimeResult};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::dispatcher::Dispatcher;
use crate::heartbeat::{HeartbeatConfig, Liveness};
use crate::replay::{ReplayConfig, ReplayState};
use crate::subscription::Subscription;
use crate::transport::{Socket, TransportReader, TransportWriter};

/// Default outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Upper bound on the close handshake at teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Reading from the socket failed
    ReadFailed(String),
    /// A frame could not be decoded as an envelope
    DecodeFailed(String),
    /// The server closed the connection
    ServerClosed,
    /// Nothing was received within the heartbeat timeout
    HeartbeatTimeout {
        /// Silence observed when the monitor gave up
        idle: Duration,
    },
    /// The outbound queue was closed
    QueueClosed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(reason) => write!(f, "read failed: {}", reason),
            Self::DecodeFailed(reason) => write!(f, "decode failed: {}", reason),
            Self::ServerClosed => write!(f, "server closed connection"),
            Self::HeartbeatTimeout { idle } => write!(f, "no inbound activity for {:?}", idle),
            Self::QueueClosed => write!(f, "outbound queue closed"),
        }
    }
}

impl From<SessionEnd> for RealtimeError {
    fn from(end: SessionEnd) -> Self {
        match end {
            SessionEnd::ReadFailed(reason) => RealtimeError::WebSocket(reason),
            SessionEnd::DecodeFailed(message) => RealtimeError::InvalidJson { message, raw: None },
            SessionEnd::ServerClosed => RealtimeError::WebSocket("Server closed connection".into()),
            SessionEnd::HeartbeatTimeout { idle } => RealtimeError::HeartbeatTimeout { idle },
            SessionEnd::QueueClosed => RealtimeError::ChannelClosed,
        }
    }
}

/// Runs the handshake and pumps for one connection at a time
#[derive(Debug)]
pub struct Session<'a> {
    subscription: &'a Subscription,
    dispatcher: &'a Dispatcher,
    heartbeat: HeartbeatConfig,
    replay: ReplayConfig,
    outbound_capacity: usize,
}

impl<'a> Session<'a> {
    /// Create a session with default heartbeat and replay settings
    pub fn new(subscription: &'a Subscription, dispatcher: &'a Dispatcher) -> Self {
        Self {
            subscription,
            dispatcher,
            heartbeat: HeartbeatConfig::default(),
            replay: ReplayConfig::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Set heartbeat timing
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set replay gating
    pub fn with_replay(mut self, replay: ReplayConfig) -> Self {
        self.replay = replay;
        self
    }

    /// Set the outbound queue capacity
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Drive a freshly dialed socket until the connection ends
    ///
    /// Returns `Err` only if the handshake could not be written. The socket
    /// is closed on every path.
    pub async fn run(&self, socket: Socket, replay: &mut ReplayState) -> RealtimeResult<SessionEnd> {
        let Socket {
            mut writer,
            mut reader,
        } = socket;

        let result = self.drive(writer.as_mut(), reader.as_mut(), replay).await;

        match timeout(CLOSE_TIMEOUT, writer.close()).await {
            Ok(Ok(())) => debug!("Socket closed"),
            Ok(Err(e)) => debug!(error = %e, "Error while closing socket"),
            Err(_) => debug!("Timed out closing socket"),
        }

        result
    }

    async fn drive(
        &self,
        writer: &mut dyn TransportWriter,
        reader: &mut dyn TransportReader,
        replay: &mut ReplayState,
    ) -> RealtimeResult<SessionEnd> {
        let now = Instant::now();
        let replay_from = replay.replay_start(&self.replay, now).cloned();
        replay.connected(now);

        match (&replay_from, replay.cursor()) {
            (Some(cursor), _) => info!(
                "replaying from {}",
                cursor.received_wall.format("%Y-%m-%d %H:%M:%S")
            ),
            (None, Some(cursor)) => info!(
                last_id = %cursor.id,
                "Replay window elapsed, resuming live with a gap"
            ),
            (None, None) => {}
        }

        for envelope in self.subscription.handshake(replay_from.as_ref())? {
            let json = envelope.to_json()?;
            debug!(kind = %envelope.kind, "Sending handshake: {}", json);
            writer
                .send(&json)
                .await
                .map_err(|e| RealtimeError::handshake(envelope.kind.as_str(), e))?;
        }

        let liveness = Liveness::new(Instant::now());
        let (outbound_tx, mut outbound_rx) = mpsc::channel(self.outbound_capacity);

        let end = tokio::select! {
            end = receive_pump(reader, &liveness, replay, self.dispatcher) => end,
            end = send_pump(writer, &mut outbound_rx) => end,
            end = heartbeat_monitor(&liveness, &outbound_tx, self.heartbeat) => end,
        };

        Ok(end)
    }
}

async fn receive_pump(
    reader: &mut dyn TransportReader,
    liveness: &Liveness,
    replay: &mut ReplayState,
    dispatcher: &Dispatcher,
) -> SessionEnd {
    loop {
        let frame = match reader.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Server closed connection");
                return SessionEnd::ServerClosed;
            }
            Err(e) => {
                warn!(error = %e, "Read failed");
                return SessionEnd::ReadFailed(e.to_string());
            }
        };

        let envelope = match Envelope::parse(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to decode frame: {}", frame);
                return SessionEnd::DecodeFailed(e.to_string());
            }
        };

        let now = Instant::now();
        liveness.touch(now);

        if envelope.is_ack() {
            trace!(id = %envelope.id, "Ack received");
            continue;
        }

        replay.record(envelope.id.as_str(), now);
        dispatcher.dispatch(envelope);
    }
}

async fn send_pump(
    writer: &mut dyn TransportWriter,
    outbound: &mut mpsc::Receiver<Envelope>,
) -> SessionEnd {
    while let Some(envelope) = outbound.recv().await {
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound envelope");
                continue;
            }
        };
        // A lost write is only fatal once the heartbeat notices the silence
        if let Err(e) = writer.send(&json).await {
            warn!(error = %e, kind = %envelope.kind, "Write failed");
        }
    }
    SessionEnd::QueueClosed
}

async fn heartbeat_monitor(
    liveness: &Liveness,
    outbound: &mpsc::Sender<Envelope>,
    config: HeartbeatConfig,
) -> SessionEnd {
    let period = config.period();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let now = Instant::now();
        if liveness.is_expired(now, config.timeout) {
            let idle = now.saturating_duration_since(liveness.last_activity());
            warn!(?idle, "No inbound activity, closing connection");
            return SessionEnd::HeartbeatTimeout { idle };
        }

        if outbound.capacity() < outbound.max_capacity() {
            trace!("Outbound traffic pending, skipping ping");
            continue;
        }

        match outbound.try_send(Envelope::ping()) {
            Ok(()) => trace!("Ping queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => return SessionEnd::QueueClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockPeer, MockTransport, Transport, TransportError};
    use battlemetrics_types::{kinds, ActivityFilter, ReplayRequest};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn recording_dispatcher() -> (Dispatcher, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(move |env: Envelope| {
            let _ = tx.send(env);
        });
        (dispatcher, rx)
    }

    async fn dial() -> (Socket, MockPeer) {
        let transport = MockTransport::new("wss://mock.test");
        let peer = transport.accept();
        (transport.connect().await.unwrap(), peer)
    }

    async fn sent(peer: &mut MockPeer) -> Envelope {
        Envelope::parse(&peer.next_sent().await.unwrap()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_then_dispatch() {
        let mut sub = Subscription::with_channels(["server:events:A"]);
        sub.filter("ACTIVITY", ActivityFilter::new().whitelist_types(["addPlayer"]));
        let (dispatcher, mut delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();

        let (socket, mut peer) = dial().await;
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::FILTER);
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);

            peer.push(r#"{"i":"a1","t":"ack"}"#);
            peer.push(r#"{"i":"m1","t":"addPlayer","c":"server:events:A","p":{"id":1}}"#);
            assert_eq!(delivered.recv().await.unwrap().id, "m1");
            peer.push_close();
        });

        assert_eq!(end.unwrap(), SessionEnd::ServerClosed);
        assert_eq!(replay.cursor().unwrap().id, "m1");
        assert_eq!(dispatcher.dispatched(), 1);
        assert!(peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_sent_within_window() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, _delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();
        replay.record("m9", Instant::now());

        tokio::time::advance(Duration::from_secs(60)).await;

        let (socket, mut peer) = dial().await;
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);
            let envelope = sent(&mut peer).await;
            assert_eq!(envelope.kind, kinds::REPLAY);
            let request: ReplayRequest = envelope.payload_as().unwrap().unwrap();
            assert_eq!(request.start, "m9");
            peer.push_close();
        });
        assert_eq!(end.unwrap(), SessionEnd::ServerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_replay_after_window() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, _delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher)
            .with_replay(ReplayConfig::new().with_window(Duration::from_secs(300)));
        let mut replay = ReplayState::new();
        replay.record("m9", Instant::now());

        tokio::time::advance(Duration::from_secs(300)).await;

        let (socket, mut peer) = dial().await;
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);
            peer.push_close();
        });
        assert_eq!(end.unwrap(), SessionEnd::ServerClosed);
        assert!(peer.try_sent().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_then_times_out() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, _delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();

        let (socket, mut peer) = dial().await;
        let start = Instant::now();
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);
            // First tick at 30s: still alive, so a ping goes out
            assert_eq!(sent(&mut peer).await.kind, kinds::PING);
            assert_eq!(start.elapsed(), Duration::from_secs(30));
        });

        match end.unwrap() {
            SessionEnd::HeartbeatTimeout { idle } => assert_eq!(idle, Duration::from_secs(90)),
            other => panic!("unexpected end: {other:?}"),
        }
        // Tick at 60s is not yet past the timeout, the one at 90s is
        assert_eq!(start.elapsed(), Duration::from_secs(90));
        assert!(peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acks_keep_connection_alive() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, _delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();

        let (socket, mut peer) = dial().await;
        let start = Instant::now();
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);
            for _ in 0..4 {
                let ping = sent(&mut peer).await;
                assert_eq!(ping.kind, kinds::PING);
                peer.push(format!(r#"{{"i":"{}","t":"ack"}}"#, ping.id));
            }
            peer.push_close();
        });

        assert_eq!(end.unwrap(), SessionEnd::ServerClosed);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
        assert_eq!(dispatcher.dispatched(), 0);
        assert!(replay.cursor().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failures_are_not_fatal() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, mut delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();

        let (socket, mut peer) = dial().await;
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);
            peer.set_fail_send(true);
            // Pings at 30s and 60s fail; the session keeps reading
            tokio::time::sleep(Duration::from_secs(61)).await;
            peer.push(r#"{"i":"m2","t":"removePlayer"}"#);
            assert_eq!(delivered.recv().await.unwrap().id, "m2");
            peer.push_error(TransportError::ReceiveFailed("reset".into()));
        });

        assert_eq!(end.unwrap(), SessionEnd::ReadFailed("receive failed: reset".into()));
        assert_eq!(replay.cursor().unwrap().id, "m2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_ends_session() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, _delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();
        replay.record("m1", Instant::now());

        let (socket, peer) = dial().await;
        peer.push("not json");
        let end = session.run(socket, &mut replay).await.unwrap();

        assert!(matches!(end, SessionEnd::DecodeFailed(_)));
        // Cursor from before the failure survives for the next attempt
        assert_eq!(replay.cursor().unwrap().id, "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_write_failure() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (dispatcher, _delivered) = recording_dispatcher();
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();

        let (socket, peer) = dial().await;
        peer.set_fail_send(true);
        let err = session.run(socket, &mut replay).await.unwrap_err();

        assert!(matches!(err, RealtimeError::HandshakeFailed { ref step, .. } if step == "join"));
        assert!(peer.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_handlers_do_not_stall_receive_pump() {
        let sub = Subscription::with_channels(["server:events:A"]);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = parking_lot::Mutex::new(release_rx);
        let (fast_tx, mut fast_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(move |env: Envelope| {
            if env.kind == "slow" {
                let _ = release_rx.lock().recv();
            } else {
                let _ = fast_tx.send(env.id);
            }
        });
        let session = Session::new(&sub, &dispatcher);
        let mut replay = ReplayState::new();

        let (socket, mut peer) = dial().await;
        let (end, _) = tokio::join!(session.run(socket, &mut replay), async {
            assert_eq!(sent(&mut peer).await.kind, kinds::JOIN);
            peer.push(r#"{"i":"s1","t":"slow"}"#);
            peer.push(r#"{"i":"s2","t":"slow"}"#);
            peer.push(r#"{"i":"f1","t":"addPlayer"}"#);

            let fast = tokio::time::timeout(Duration::from_secs(2), fast_rx.recv()).await;
            assert_eq!(fast.ok().flatten().as_deref(), Some("f1"));

            release_tx.send(()).unwrap();
            release_tx.send(()).unwrap();
            peer.push_close();
        });

        assert_eq!(end.unwrap(), SessionEnd::ServerClosed);
        assert_eq!(replay.cursor().unwrap().id, "f1");
        assert_eq!(dispatcher.dispatched(), 3);
    }

    #[test]
    fn test_session_end_into_error() {
        let err: RealtimeError = SessionEnd::HeartbeatTimeout {
            idle: Duration::from_secs(61),
        }
        .into();
        assert!(matches!(err, RealtimeError::HeartbeatTimeout { .. }));
        assert!(err.requires_reconnect());
    }
}
