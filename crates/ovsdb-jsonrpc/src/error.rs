//! Transport error types
//!
//! Every variant is cheap to clone: a single connection failure has to reach
//! each pending call and every subscription listening on that connection.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the JSON-RPC transport
#[derive(Error, Debug, Clone)]
pub enum JsonRpcError {
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Remote error: {0}")]
    Remote(Value),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using the transport error
pub type Result<T> = std::result::Result<T, JsonRpcError>;

impl JsonRpcError {
    /// Create a connection-closed error
    pub fn closed(reason: impl Into<String>) -> Self {
        JsonRpcError::ConnectionClosed(reason.into())
    }

    /// Create a protocol violation error
    pub fn protocol(detail: impl Into<String>) -> Self {
        JsonRpcError::ProtocolViolation(detail.into())
    }

    /// Returns true if the connection is gone and no retry on it can succeed
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            JsonRpcError::ConnectionClosed(_) | JsonRpcError::ProtocolViolation(_)
        )
    }
}

impl From<serde_json::Error> for JsonRpcError {
    fn from(err: serde_json::Error) -> Self {
        JsonRpcError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_classification() {
        assert!(JsonRpcError::closed("eof").is_connection_closed());
        assert!(JsonRpcError::protocol("bad frame").is_connection_closed());
        assert!(!JsonRpcError::Remote(Value::Null).is_connection_closed());
        assert!(!JsonRpcError::Timeout(Duration::from_secs(1)).is_connection_closed());
    }
}
