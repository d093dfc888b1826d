//! Error types for reference operations.

use thiserror::Error;
use verso_types::ObjId;

use crate::retry::RetryExhausted;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// A reference with this name already exists.
    #[error("ref already exists: {name}")]
    AlreadyExists { name: String },

    /// The reference moved since the caller read it.
    #[error("reference conflict on {name}: expected {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: ObjId,
        actual: ObjId,
    },

    /// The name is not a valid reference name.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A reference may only point at a stored commit.
    #[error("commit not found: {0}")]
    CommitNotFound(ObjId),

    /// An operation kept losing races until its retry budget ran out.
    #[error(transparent)]
    RetryTimeout(#[from] RetryExhausted),

    /// Backend operation failed.
    #[error("store error: {0}")]
    Store(#[from] verso_store::StoreError),
}

impl RefError {
    /// Returns `true` if re-reading state and trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::RetryTimeout(_) => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
