//! Transport error handling

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the push transport
///
/// None of these are fatal to the transport itself: connection-level
/// failures feed the reconnect loop, and only sends report them to callers.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connecting to the endpoint failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The WebSocket reported an error mid-connection
    #[error("WebSocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    /// The peer went away while a frame was being written
    #[error("Connection closed by peer")]
    Disconnected,

    /// The transport was torn down
    #[error("Transport is shut down")]
    Closed,

    /// The connection did not open in time to deliver a send
    #[error("Send not delivered within {0:?}")]
    SendTimeout(Duration),

    /// An outbound envelope could not be serialized
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether retrying later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_)
                | TransportError::Socket(_)
                | TransportError::Disconnected
                | TransportError::SendTimeout(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            TransportError::Connect(_) => {
                Some("Check that the socket URL is correct and the server is reachable.")
            }
            TransportError::SendTimeout(_) => {
                Some("The connection is still down. The message was not sent; try again once reconnected.")
            }
            TransportError::Closed => Some("Restart the connection before sending."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(TransportError::Connect("refused".to_string()).is_recoverable());
        assert!(TransportError::SendTimeout(Duration::from_secs(1)).is_recoverable());
        assert!(!TransportError::Closed.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::SendTimeout(Duration::from_secs(10));
        assert!(err.to_string().contains("10s"));
        assert!(err.recovery_suggestion().is_some());
    }
}
