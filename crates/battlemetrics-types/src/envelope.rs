//! Envelope exchanged in both directions over the real-time socket
//!
//! Every frame is a JSON object with short keys:
//!
//! | key | meaning |
//! |-----|---------|
//! | `i` | correlation id, unique per outbound message |
//! | `t` | message type |
//! | `c` | channel name (inbound events only) |
//! | `p` | type-specific payload |

use crate::error::RealtimeResult;
use crate::filter::ActivityFilter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message type names used by the client protocol
pub mod kinds {
    /// Subscribe to a list of channels
    pub const JOIN: &str = "join";
    /// Install a server-side filter
    pub const FILTER: &str = "filter";
    /// Request events missed since a message id
    pub const REPLAY: &str = "replay";
    /// Client keepalive
    pub const PING: &str = "ping";
    /// Server acknowledgement
    pub const ACK: &str = "ack";
}

/// Channel carrying the event stream of one game server
pub fn server_events_channel(server_id: impl AsRef<str>) -> String {
    format!("server:events:{}", server_id.as_ref())
}

/// One message unit on the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id
    #[serde(rename = "i")]
    pub id: String,
    /// Message type discriminator
    #[serde(rename = "t")]
    pub kind: String,
    /// Channel name
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Type-specific payload
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Payload of a `filter` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Filter target type
    #[serde(rename = "type")]
    pub target: String,
    /// Filter specification
    pub filter: ActivityFilter,
}

/// Payload of a `replay` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRequest {
    /// Channels to replay
    pub channels: Vec<String>,
    /// Id of the last envelope received before the gap
    pub start: String,
}

impl Envelope {
    /// Create an outbound envelope with a fresh unique id
    pub fn outbound(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            channel: None,
            payload,
        }
    }

    /// Create a `filter` envelope for one filter target
    pub fn filter(target: impl Into<String>, filter: &ActivityFilter) -> RealtimeResult<Self> {
        let request = FilterRequest {
            target: target.into(),
            filter: filter.clone(),
        };
        Ok(Self::outbound(kinds::FILTER, Some(serde_json::to_value(request)?)))
    }

    /// Create a `join` envelope for the full channel list
    pub fn join(channels: &[String]) -> Self {
        let channels = channels.iter().cloned().map(Value::String).collect();
        Self::outbound(kinds::JOIN, Some(Value::Array(channels)))
    }

    /// Create a `replay` envelope starting after `start`
    pub fn replay(channels: &[String], start: impl Into<String>) -> RealtimeResult<Self> {
        let request = ReplayRequest {
            channels: channels.to_vec(),
            start: start.into(),
        };
        Ok(Self::outbound(kinds::REPLAY, Some(serde_json::to_value(request)?)))
    }

    /// Create a keepalive `ping` envelope
    pub fn ping() -> Self {
        Self::outbound(kinds::PING, None)
    }

    /// Check if this is a server acknowledgement
    pub fn is_ack(&self) -> bool {
        self.kind == kinds::ACK
    }

    /// Parse an envelope from a text frame
    pub fn parse(text: &str) -> RealtimeResult<Self> {
        serde_json::from_str(text).map_err(|e| crate::RealtimeError::InvalidJson {
            message: e.to_string(),
            raw: Some(text.to_string()),
        })
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload into a concrete type
    ///
    /// Returns `Ok(None)` when the envelope carries no payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> RealtimeResult<Option<T>> {
        match &self.payload {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }
}
