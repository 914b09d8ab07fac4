//! Unified error types.

use thiserror::Error;

/// WebSocket and normalization errors.
///
/// `Clone` so a single error can be fanned out to every subscriber of a
/// connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WsError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("No authenticated identity available")]
    MissingIdentity,

    #[error("Connection closed: code={code:?} reason={reason}")]
    Closed { code: Option<u16>, reason: String },

    #[error("Max reconnect attempts reached ({attempts})")]
    MaxReconnectAttempts { attempts: u32 },

    #[error("Server error: {message} (code: {code:?})")]
    Server {
        message: String,
        code: Option<String>,
    },

    #[error("Failed to parse message: {0}")]
    MessageParse(String),

    #[error("No tokio runtime available")]
    NoRuntime,
}

impl WsError {
    /// Whether the error came from the transport rather than the payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WsError::NotConnected
                | WsError::ConnectionFailed(_)
                | WsError::Timeout
                | WsError::SendFailed(_)
                | WsError::Closed { .. }
                | WsError::MaxReconnectAttempts { .. }
        )
    }
}

#[cfg(feature = "ws-native")]
impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match err {
            Error::ConnectionClosed => WsError::Closed {
                code: Some(1000),
                reason: "Connection closed normally".to_string(),
            },
            Error::AlreadyClosed => WsError::NotConnected,
            Error::Url(e) => WsError::InvalidUrl(e.to_string()),
            Error::Http(resp) => {
                WsError::ConnectionFailed(format!("HTTP error: {:?}", resp.status()))
            }
            Error::HttpFormat(e) => WsError::ConnectionFailed(e.to_string()),
            Error::Io(e) => WsError::ConnectionFailed(e.to_string()),
            other => WsError::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for WsError {
    fn from(err: serde_json::Error) -> Self {
        WsError::MessageParse(err.to_string())
    }
}

/// Result type alias for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(WsError::Timeout.is_transport());
        assert!(WsError::MaxReconnectAttempts { attempts: 10 }.is_transport());
        assert!(!WsError::MissingIdentity.is_transport());
        assert!(!WsError::MessageParse("bad".into()).is_transport());
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(WsError::from(err), WsError::MessageParse(_)));
    }

    #[test]
    fn test_display() {
        let err = WsError::Server {
            message: "Engine unavailable".into(),
            code: Some("ENGINE".into()),
        };
        assert_eq!(
            err.to_string(),
            "Server error: Engine unavailable (code: Some(\"ENGINE\"))"
        );
    }
}
