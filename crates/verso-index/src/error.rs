//! Error types for the index crate.

use verso_types::ObjId;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A stripe table pointed at another stripe table.
    #[error("index segment {0} is not a leaf")]
    NestedStripes(ObjId),

    /// Backend operation failed.
    #[error("store error: {0}")]
    Store(#[from] verso_store::StoreError),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for IndexError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
