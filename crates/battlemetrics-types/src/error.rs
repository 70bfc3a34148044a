//! Error types for the real-time client

use std::time::Duration;
use thiserror::Error;

/// Main error type for real-time client operations
#[derive(Error, Debug)]
pub enum RealtimeError {
    // === Connection Errors ===
    /// Failed to establish WebSocket connection
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connection attempt timed out
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // === Protocol Errors ===
    /// Failed to encode or decode a JSON envelope
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String, raw: Option<String> },

    /// A handshake envelope could not be written
    #[error("Handshake failed while sending {step}: {reason}")]
    HandshakeFailed { step: String, reason: String },

    /// No inbound traffic within the liveness window
    #[error("No inbound activity for {idle:?}")]
    HeartbeatTimeout { idle: Duration },

    // === Internal Errors ===
    /// Internal channel was closed unexpectedly
    #[error("Internal channel closed unexpectedly")]
    ChannelClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RealtimeError {
    /// Returns true if this error is recovered from by dialing again
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    /// Returns true if this error ends the current physical connection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_)
                | Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::HandshakeFailed { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::ChannelClosed
        )
    }

    /// Create a handshake failure for the given step
    pub fn handshake(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::HandshakeFailed {
            step: step.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
            raw: None,
        }
    }
}

/// Result type alias for real-time client operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;
