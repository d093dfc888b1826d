//! Error types for commit operations.

use verso_refs::{NamedRef, RefError};
use verso_types::ContentKey;

use crate::conflict::CommitConflict;

/// Errors produced by commit operations.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// One or more per-key expectations did not hold.
    #[error("commit conflicts: {}", describe(.0))]
    Conflicts(Vec<CommitConflict>),

    /// The same key appeared twice in one commit.
    #[error("duplicate key in commit: {0}")]
    DuplicateKey(ContentKey),

    /// Commits can only be made on branches.
    #[error("not a branch: {0}")]
    NotABranch(NamedRef),

    /// Reference missing, moved, or otherwise unusable.
    #[error(transparent)]
    Ref(#[from] RefError),

    #[error("index error: {0}")]
    Index(#[from] verso_index::IndexError),

    #[error("diff error: {0}")]
    Diff(#[from] verso_diff::DiffError),

    #[error("store error: {0}")]
    Store(#[from] verso_store::StoreError),
}

impl CommitError {
    /// Returns `true` if re-reading the branch and trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ref(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

fn describe(conflicts: &[CommitConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for commit results.
pub type CommitResult<T> = Result<T, CommitError>;
