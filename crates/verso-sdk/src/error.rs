use thiserror::Error;
use verso_commit::{CommitConflict, CommitError};
use verso_dag::DagError;
use verso_diff::DiffError;
use verso_index::IndexError;
use verso_merge::{MergeError, MergeResult};
use verso_refs::{RefError, RetryExhausted};
use verso_store::StoreError;
use verso_types::{ObjId, TypeError};

/// Errors surfaced by [`VersionStore`](crate::VersionStore).
///
/// Lower-layer errors are sorted into the kinds a client needs to decide
/// whether to re-read and try again; see [`is_retryable`](Self::is_retryable).
#[derive(Debug, Error)]
pub enum VersionStoreError {
    /// Referenced objects have no backing data.
    #[error("objects not found: {0:?}")]
    ObjNotFound(Vec<ObjId>),

    #[error("object {id} too large: {size} bytes exceeds limit of {limit} bytes")]
    ObjTooLarge { id: ObjId, size: usize, limit: usize },

    /// The reference moved since the caller read it, or is not where the
    /// caller expected it.
    #[error("reference conflict on {name}: expected {expected}, found {actual}")]
    ReferenceConflict {
        name: String,
        expected: ObjId,
        actual: ObjId,
    },

    #[error("reference already exists: {0}")]
    RefAlreadyExists(String),

    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// The backend throttled the request.
    #[error("backend limit exceeded: {0}")]
    BackendLimitExceeded(String),

    #[error(transparent)]
    RetryTimeout(#[from] RetryExhausted),

    /// Per-key checks of a commit failed: a reference conflict narrowed
    /// down to the offending keys.
    #[error("commit conflicts on {} keys", .0.len())]
    CommitConflict(Vec<CommitConflict>),

    /// A merge or transplant found conflicts; carries the full report.
    #[error("merge into {} has {} conflicts", .0.target_branch, .0.conflicts().count())]
    MergeConflict(Box<MergeResult>),

    /// The request itself is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored data could not be interpreted.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// The runtime dropped a background call before it finished.
    #[error("background call cancelled")]
    Cancelled,
}

impl VersionStoreError {
    /// `true` for failures that may succeed after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ReferenceConflict { .. }
                | Self::CommitConflict(_)
                | Self::BackendLimitExceeded(_)
                | Self::RetryTimeout(_)
        )
    }
}

impl From<StoreError> for VersionStoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::ObjNotFound(vec![id]),
            StoreError::NotFoundMany(ids) => Self::ObjNotFound(ids),
            StoreError::ObjTooLarge { id, size, limit } => Self::ObjTooLarge { id, size, limit },
            StoreError::BackendLimitExceeded(msg) => Self::BackendLimitExceeded(msg),
            other @ (StoreError::UnknownContentType(_)
            | StoreError::DuplicateContentType(_)
            | StoreError::InvalidContent { .. }
            | StoreError::Config(_)) => Self::InvalidArgument(other.to_string()),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

impl From<RefError> for VersionStoreError {
    fn from(e: RefError) -> Self {
        match e {
            RefError::NotFound { name } => Self::RefNotFound(name),
            RefError::AlreadyExists { name } => Self::RefAlreadyExists(name),
            RefError::Conflict {
                name,
                expected,
                actual,
            } => Self::ReferenceConflict {
                name,
                expected,
                actual,
            },
            RefError::CommitNotFound(id) => Self::ObjNotFound(vec![id]),
            RefError::RetryTimeout(e) => Self::RetryTimeout(e),
            RefError::Store(e) => e.into(),
            other @ RefError::InvalidName { .. } => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl From<IndexError> for VersionStoreError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Store(e) => e.into(),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

impl From<DiffError> for VersionStoreError {
    fn from(e: DiffError) -> Self {
        match e {
            DiffError::Index(e) => e.into(),
            DiffError::Store(e) => e.into(),
        }
    }
}

impl From<DagError> for VersionStoreError {
    fn from(e: DagError) -> Self {
        match e {
            DagError::Store(e) => e.into(),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

impl From<CommitError> for VersionStoreError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::Conflicts(conflicts) => Self::CommitConflict(conflicts),
            CommitError::Ref(e) => e.into(),
            CommitError::Index(e) => e.into(),
            CommitError::Diff(e) => e.into(),
            CommitError::Store(e) => e.into(),
            other @ (CommitError::DuplicateKey(_) | CommitError::NotABranch(_)) => {
                Self::InvalidArgument(other.to_string())
            }
        }
    }
}

impl From<MergeError> for VersionStoreError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::Conflict(result) => Self::MergeConflict(result),
            MergeError::Commit(e) => e.into(),
            MergeError::Ref(e) => e.into(),
            MergeError::Dag(e) => e.into(),
            MergeError::Index(e) => e.into(),
            MergeError::Diff(e) => e.into(),
            MergeError::Store(e) => e.into(),
            other @ (MergeError::NotABranch(_) | MergeError::NothingToTransplant) => {
                Self::InvalidArgument(other.to_string())
            }
        }
    }
}

impl From<TypeError> for VersionStoreError {
    fn from(e: TypeError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

pub type VersionStoreResult<T> = Result<T, VersionStoreError>;
