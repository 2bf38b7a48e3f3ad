//! Error types for coscene-gossip

use coscene_core::TransportError;
use thiserror::Error;

/// Errors that can occur in the gossip layer
#[derive(Debug, Error)]
pub enum GossipError {
    /// Failed to subscribe to topic
    #[error("failed to subscribe to topic: {0}")]
    SubscribeFailed(String),

    /// Failed to broadcast message
    #[error("failed to broadcast message: {0}")]
    BroadcastFailed(String),

    /// Already joined this session
    #[error("already joined session {0}")]
    AlreadyJoined(String),
}

impl From<GossipError> for TransportError {
    fn from(e: GossipError) -> Self {
        match e {
            GossipError::BroadcastFailed(msg) => TransportError::SendFailed(msg),
            other => TransportError::ReceiveFailed(other.to_string()),
        }
    }
}

/// Result type for gossip operations
pub type GossipResult<T> = Result<T, GossipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_failure_is_a_send_failure() {
        let err: TransportError = GossipError::BroadcastFailed("no neighbors".into()).into();
        assert!(matches!(err, TransportError::SendFailed(msg) if msg == "no neighbors"));
    }

    #[test]
    fn test_join_failures_surface_as_receive_failures() {
        let err: TransportError = GossipError::AlreadyJoined("coscene/demo".into()).into();
        assert!(matches!(err, TransportError::ReceiveFailed(msg) if msg.contains("coscene/demo")));
    }
}
