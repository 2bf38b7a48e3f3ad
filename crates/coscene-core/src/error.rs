//! Error types for Coscene

use thiserror::Error;

/// Top-level error type for Coscene core operations
#[derive(Debug, Error)]
pub enum CosceneError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors related to transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Session is not active")]
    SessionInactive,
}

/// Errors raised when parsing a named scene value (kind, action, effect type)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown effect type: {0}")]
    UnknownEffectType(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type alias for Coscene core operations
pub type CosceneResult<T> = Result<T, CosceneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::SendFailed("timeout".to_string());
        assert!(format!("{}", err).contains("Send failed"));
        assert!(format!("{}", err).contains("timeout"));

        assert!(format!("{}", TransportError::ConnectionClosed).contains("closed"));
        assert!(format!("{}", TransportError::SessionInactive).contains("not active"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::UnknownEntityKind("unicorn".to_string());
        assert!(format!("{}", err).contains("unicorn"));

        let err = ParseError::UnknownAction("moonwalk".to_string());
        assert!(format!("{}", err).contains("Unknown action"));
    }

    #[test]
    fn test_error_conversions() {
        let err: CosceneError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, CosceneError::Transport(_)));

        let err: CosceneError = ParseError::UnknownEffectType("x".to_string()).into();
        assert!(matches!(err, CosceneError::Parse(_)));
        assert!(format!("{}", err).contains("Parse error"));
    }
}
