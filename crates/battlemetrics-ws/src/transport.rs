//! WebSocket transport abstraction
//!
//! This module provides a trait-based abstraction over WebSocket connections,
//! enabling unit testing of the session and reconnection logic without real
//! network calls.
//!
//! A successful [`Transport::connect`] yields a [`Socket`] already split into
//! a reader half and a writer half, so the receive pump and the send pump can
//! each own one side.
//!
//! # Example
//!
//! ```no_run
//! use battlemetrics_ws::transport::{Transport, TransportError, WsTransport};
//!
//! async fn example() -> Result<(), TransportError> {
//!     let transport = WsTransport::new("wss://ws.battlemetrics.com");
//!     let mut socket = transport.connect().await?;
//!     socket.writer.send(r#"{"i":"1","t":"ping"}"#).await?;
//!     if let Some(frame) = socket.reader.recv().await? {
//!         println!("Received: {}", frame);
//!     }
//!     socket.writer.close().await
//! }
//! ```

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

use battlemetrics_types::RealtimeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<TransportError> for RealtimeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => RealtimeError::ChannelClosed,
            other => RealtimeError::WebSocket(other.to_string()),
        }
    }
}

/// Writing half of an open connection
#[async_trait]
pub trait TransportWriter: Send {
    /// Send a text frame
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reading half of an open connection
#[async_trait]
pub trait TransportReader: Send {
    /// Receive the next text frame
    ///
    /// Returns `None` if the server closed the connection gracefully.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// An open connection, split for concurrent reading and writing
pub struct Socket {
    /// Writing half, owned by the send pump
    pub writer: Box<dyn TransportWriter>,
    /// Reading half, owned by the receive pump
    pub reader: Box<dyn TransportReader>,
}

/// Trait for WebSocket transport abstraction
///
/// Each call to [`connect`](Transport::connect) dials one new physical
/// connection. This enables injecting mock implementations instead of real
/// WebSocket connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dial the endpoint
    async fn connect(&self) -> Result<Socket, TransportError>;

    /// Get the endpoint URL
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn connect(&self) -> Result<Socket, TransportError> {
        (**self).connect().await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Real WebSocket transport using tokio-tungstenite
pub struct WsTransport {
    url: String,
    connect_timeout: Option<Duration>,
}

impl WsTransport {
    /// Create a new WebSocket transport
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: None,
        }
    }

    /// Bound each dial attempt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<Socket, TransportError> {
        debug!("Connecting to WebSocket");

        let connect_future = connect_async(self.url.as_str());
        let result = match self.connect_timeout {
            Some(limit) => timeout(limit, connect_future)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => connect_future.await,
        };
        let (ws_stream, _response) =
            result.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected");
        let (sink, stream) = ws_stream.split();
        Ok(Socket {
            writer: Box::new(WsWriter { sink }),
            reader: Box::new(WsReader { stream }),
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    #[instrument(skip(self, message), fields(len = message.len()))]
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportReader for WsReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockPeer, MockTransport};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    type Inbound = Result<Option<String>, TransportError>;

    enum MockDial {
        Fail,
        Accept {
            inbound: mpsc::UnboundedReceiver<Inbound>,
            outbound: mpsc::UnboundedSender<String>,
            fail_send: Arc<AtomicBool>,
            closed: Arc<AtomicBool>,
        },
    }

    /// Mock transport for testing
    ///
    /// Dial outcomes are scripted in order with [`fail_next`](Self::fail_next)
    /// and [`accept`](Self::accept). Dialing with an empty script fails.
    pub struct MockTransport {
        url: String,
        script: Mutex<VecDeque<MockDial>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl MockTransport {
        /// Create a new mock transport
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                url: url.into(),
                script: Mutex::new(VecDeque::new()),
                attempts: Mutex::new(Vec::new()),
            }
        }

        /// Script a failed dial
        pub fn fail_next(&self) {
            self.script.lock().push_back(MockDial::Fail);
        }

        /// Script a successful dial and get the server side of it
        pub fn accept(&self) -> MockPeer {
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let fail_send = Arc::new(AtomicBool::new(false));
            let closed = Arc::new(AtomicBool::new(false));

            self.script.lock().push_back(MockDial::Accept {
                inbound: inbound_rx,
                outbound: outbound_tx,
                fail_send: Arc::clone(&fail_send),
                closed: Arc::clone(&closed),
            });

            MockPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
                fail_send,
                closed,
            }
        }

        /// Instants at which `connect` was called
        pub fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().clone()
        }

        /// Number of times `connect` was called
        pub fn attempt_count(&self) -> usize {
            self.attempts.lock().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self) -> Result<Socket, TransportError> {
            self.attempts.lock().push(Instant::now());

            let dial = self.script.lock().pop_front();
            match dial {
                Some(MockDial::Accept {
                    inbound,
                    outbound,
                    fail_send,
                    closed,
                }) => Ok(Socket {
                    writer: Box::new(MockWriter {
                        outbound,
                        fail_send,
                        closed,
                    }),
                    reader: Box::new(MockReader { inbound }),
                }),
                Some(MockDial::Fail) | None => Err(TransportError::ConnectionFailed(
                    "mock connection failure".into(),
                )),
            }
        }

        fn endpoint(&self) -> &str {
            &self.url
        }
    }

    struct MockWriter {
        outbound: mpsc::UnboundedSender<String>,
        fail_send: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TransportWriter for MockWriter {
        async fn send(&mut self, message: &str) -> Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed);
            }
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("mock send failure".into()));
            }
            self.outbound
                .send(message.to_string())
                .map_err(|_| TransportError::ConnectionClosed)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockReader {
        inbound: mpsc::UnboundedReceiver<Inbound>,
    }

    #[async_trait]
    impl TransportReader for MockReader {
        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            // A dropped peer looks like a reset connection
            self.inbound
                .recv()
                .await
                .unwrap_or(Err(TransportError::ConnectionClosed))
        }
    }

    /// Server side of one scripted connection
    ///
    /// Dropping the peer simulates an abrupt disconnect.
    pub struct MockPeer {
        inbound: mpsc::UnboundedSender<Inbound>,
        outbound: mpsc::UnboundedReceiver<String>,
        fail_send: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl MockPeer {
        /// Deliver a text frame to the client
        pub fn push(&self, frame: impl Into<String>) {
            let _ = self.inbound.send(Ok(Some(frame.into())));
        }

        /// Close the connection from the server side
        pub fn push_close(&self) {
            let _ = self.inbound.send(Ok(None));
        }

        /// Fail the client's next read
        pub fn push_error(&self, error: TransportError) {
            let _ = self.inbound.send(Err(error));
        }

        /// Make the client's writes fail (or succeed again)
        pub fn set_fail_send(&self, fail: bool) {
            self.fail_send.store(fail, Ordering::SeqCst);
        }

        /// Wait for the next frame written by the client
        pub async fn next_sent(&mut self) -> Option<String> {
            self.outbound.recv().await
        }

        /// Take a frame written by the client, if one is waiting
        pub fn try_sent(&mut self) -> Option<String> {
            self.outbound.try_recv().ok()
        }

        /// Check if the client closed its side
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_send_recv() {
        let transport = MockTransport::new("wss://mock.test");
        let mut peer = transport.accept();
        peer.push(r#"{"i":"a","t":"ack"}"#);

        let mut socket = transport.connect().await.unwrap();
        socket.writer.send(r#"{"i":"p","t":"ping"}"#).await.unwrap();
        assert!(peer.try_sent().unwrap().contains("ping"));

        let frame = socket.reader.recv().await.unwrap();
        assert!(frame.unwrap().contains("ack"));
    }

    #[tokio::test]
    async fn test_mock_transport_connection_failure() {
        let transport = MockTransport::new("wss://mock.test");
        transport.fail_next();

        assert!(transport.connect().await.is_err());
        // Unscripted dials fail too
        assert!(transport.connect().await.is_err());
        assert_eq!(transport.attempt_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_close() {
        let transport = MockTransport::new("wss://mock.test");
        let peer = transport.accept();
        peer.push_close();

        let mut socket = transport.connect().await.unwrap();
        assert!(socket.reader.recv().await.unwrap().is_none());

        socket.writer.close().await.unwrap();
        assert!(peer.is_closed());
        assert!(matches!(
            socket.writer.send("late").await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_peer_resets_reader() {
        let transport = MockTransport::new("wss://mock.test");
        drop(transport.accept());

        let mut socket = transport.connect().await.unwrap();
        assert!(matches!(
            socket.reader.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: RealtimeError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, RealtimeError::ChannelClosed));

        let err: RealtimeError = TransportError::Timeout(Duration::from_secs(3)).into();
        assert!(err.requires_reconnect());
    }
}
