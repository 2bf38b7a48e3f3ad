//! Error types for coscene-store

use thiserror::Error;

/// Errors returned by [`StoreHandle`](crate::StoreHandle)
///
/// Mutations on unknown ids are not errors; they are reported as no-ops.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State owner task has shut down")]
    Closed,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
