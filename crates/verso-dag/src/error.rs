//! Error types for commit graph traversal.

use verso_types::ObjId;

/// Errors that can occur while walking the commit graph.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// The two heads share no history.
    #[error("no common ancestor of {0} and {1}")]
    NoCommonAncestor(ObjId, ObjId),

    /// Backend operation failed.
    #[error("store error: {0}")]
    Store(#[from] verso_store::StoreError),
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
