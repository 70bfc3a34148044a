//! WebSocket endpoint definitions

use std::fmt;

/// BattleMetrics real-time endpoints
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// Production feed (default)
    #[default]
    Production,
    /// Any other URL (local relays, test servers)
    Custom(String),
}

impl Endpoint {
    /// Get the WebSocket URL for this endpoint
    pub fn url(&self) -> &str {
        match self {
            Self::Production => "wss://ws.battlemetrics.com",
            Self::Custom(url) => url,
        }
    }

    /// Check if the endpoint uses TLS
    pub fn is_secure(&self) -> bool {
        self.url().starts_with("wss://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(Endpoint::Production.url(), "wss://ws.battlemetrics.com");
        assert_eq!(
            Endpoint::Custom("ws://127.0.0.1:9000".into()).url(),
            "ws://127.0.0.1:9000"
        );
    }

    #[test]
    fn test_is_secure() {
        assert!(Endpoint::Production.is_secure());
        assert!(!Endpoint::Custom("ws://localhost".into()).is_secure());
    }
}
