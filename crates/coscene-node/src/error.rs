//! Error types for the scene node

use coscene_logging::LogError;
use coscene_store::StoreError;
use coscene_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while configuring or running a node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Reading or writing the config file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML or has the wrong shape
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Logging error: {0}")]
    Logging(#[from] LogError),
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;
