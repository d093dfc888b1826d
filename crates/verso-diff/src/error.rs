//! Error types for the diff crate.

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Reading a key index failed.
    #[error("index error: {0}")]
    Index(#[from] verso_index::IndexError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] verso_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
