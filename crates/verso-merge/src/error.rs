//! Error types for merge and transplant.

use verso_refs::NamedRef;

use crate::types::MergeResult;

/// Errors produced by merge and transplant.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Unresolved per-key conflicts. Nothing was written; the result holds
    /// every decision that was made.
    #[error("merge conflict on {} key(s) into {}", .0.conflicts().count(), .0.target_branch)]
    Conflict(Box<MergeResult>),

    /// Merges and transplants only target branches.
    #[error("not a branch: {0}")]
    NotABranch(NamedRef),

    /// A transplant was given no commits.
    #[error("no commits to transplant")]
    NothingToTransplant,

    #[error(transparent)]
    Commit(#[from] verso_commit::CommitError),

    #[error(transparent)]
    Ref(#[from] verso_refs::RefError),

    #[error("dag error: {0}")]
    Dag(#[from] verso_dag::DagError),

    #[error("index error: {0}")]
    Index(#[from] verso_index::IndexError),

    #[error("diff error: {0}")]
    Diff(#[from] verso_diff::DiffError),

    #[error("store error: {0}")]
    Store(#[from] verso_store::StoreError),
}

impl MergeError {
    /// Returns `true` if re-reading the target and trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Commit(e) => e.is_retryable(),
            Self::Ref(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience alias for merge and transplant results.
pub type MergeOpResult<T> = Result<T, MergeError>;
