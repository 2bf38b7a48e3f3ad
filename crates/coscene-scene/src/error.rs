//! Error types for coscene-scene

use coscene_core::EntityId;
use thiserror::Error;

/// Errors a [`Renderer`](crate::Renderer) can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Failed to instantiate resources for {0}: {1}")]
    Resource(EntityId, String),

    #[error("Renderer has no node for {0}")]
    UnknownEntity(EntityId),

    #[error("Renderer is shut down")]
    Closed,
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
