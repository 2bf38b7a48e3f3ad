//! Error types for coscene-sync

use coscene_core::TransportError;
use coscene_store::StoreError;
use thiserror::Error;

/// Errors that can occur while synchronizing
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Message of kind {kind} is missing field `{field}`")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::MissingField {
            kind: "EntityRemoved",
            field: "entityId",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("EntityRemoved"));
        assert!(msg.contains("entityId"));

        let err: SyncError = TransportError::ConnectionClosed.into();
        assert!(format!("{}", err).contains("Transport error"));

        let err: SyncError = StoreError::Closed.into();
        assert!(format!("{}", err).contains("Store error"));
    }
}
