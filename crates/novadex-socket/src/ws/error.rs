/*
[INPUT]:  Error sources (transport connect, serialization, URLs)
[OUTPUT]: Structured error types with retry hints
[POS]:    Error handling layer - unified error type for the socket crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;

/// Main error type for the socket layer.
///
/// Runtime failures never surface as return values from subscribe/emit
/// paths; they reach callers through the configured hooks. The variants
/// returned synchronously are precondition violations only.
#[derive(Error, Debug)]
pub enum SocketError {
    /// Transport-level connect failure
    #[error("connect failed: {0}")]
    Connect(String),

    /// Subscribe called with an empty stream list
    #[error("subscribe requires at least one stream")]
    EmptyStreams,

    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error after the connection was established
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl SocketError {
    /// Check if the error is retryable by the reconnect loop
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SocketError::Connect(_) | SocketError::WebSocket(_)
        )
    }
}

/// Result type alias for socket operations
pub type Result<T> = std::result::Result<T, SocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(SocketError::Connect("refused".into()).is_retryable());
        assert!(SocketError::WebSocket("reset".into()).is_retryable());
        assert!(!SocketError::EmptyStreams.is_retryable());
    }

    #[test]
    fn test_url_error_conversion() {
        let err = url::Url::parse("not a url").unwrap_err();
        let socket_err: SocketError = err.into();
        assert!(matches!(socket_err, SocketError::UrlParse(_)));
    }
}
