//! Error types for the order book feed

use thiserror::Error;

/// Order book feed errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Transport not ready: {0}")]
    NotReady(String),

    #[error("Price precision \"{0}\" is not valid")]
    InvalidPrecision(String),

    #[error("Exchange error ({code}): {msg}")]
    ExchangeError { code: i64, msg: String },

    #[error("Transport closed uncleanly")]
    TransportClosedUnclean,

    #[error("Transport closed")]
    TransportClosedClean,

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Data frame received without an active subscription")]
    UnsolicitedFrame,

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FeedError {
    /// Close reason reported by the transport
    pub fn transport_closed(clean: bool) -> Self {
        if clean {
            FeedError::TransportClosedClean
        } else {
            FeedError::TransportClosedUnclean
        }
    }

    /// Whether the connection manager answers this close with a reconnect
    pub fn triggers_reconnect(&self) -> bool {
        matches!(self, FeedError::TransportClosedUnclean)
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::IpcError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_close_reasons() {
        assert!(matches!(
            FeedError::transport_closed(true),
            FeedError::TransportClosedClean
        ));
        assert!(FeedError::transport_closed(false).triggers_reconnect());
        assert!(!FeedError::transport_closed(true).triggers_reconnect());
        assert!(!FeedError::ParseError("bad".to_string()).triggers_reconnect());
    }

    #[test]
    fn test_exchange_error_message() {
        let err = FeedError::ExchangeError {
            code: 10300,
            msg: "Subscription failed (generic)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Exchange error (10300): Subscription failed (generic)"
        );
    }
}
