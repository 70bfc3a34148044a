//! Wire types for the BattleMetrics real-time WebSocket feed
//!
//! This crate holds the data contract shared by the client and its callers.
//! It has no async runtime dependency and can be used independently.
//!
//! # Key Types
//!
//! - [`Envelope`] - One message on the socket (`i`, `t`, `c`, `p`)
//! - [`FilterRequest`], [`ReplayRequest`] - Outbound payload shapes
//! - [`ActivityFilter`], [`TagTypeMode`] - Server-side filter configuration
//! - [`RealtimeError`] - Error types

pub mod envelope;
pub mod error;
pub mod filter;

// Re-export commonly used types
pub use envelope::*;
pub use error::*;
pub use filter::*;
