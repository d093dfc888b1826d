use verso_crypto::HasherError;
use verso_types::ObjId;

use crate::object::ObjType;

/// Errors from persist backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object has no backing data.
    #[error("object not found: {0}")]
    NotFound(ObjId),

    /// Several requested objects have no backing data.
    #[error("objects not found: {0:?}")]
    NotFoundMany(Vec<ObjId>),

    /// The backend rejected an object because of its per-item size limit.
    #[error("object {id} too large: {size} bytes exceeds limit of {limit} bytes")]
    ObjTooLarge { id: ObjId, size: usize, limit: usize },

    /// The backend is throttling requests. Retryable with backoff.
    #[error("backend limit exceeded: {0}")]
    BackendLimitExceeded(String),

    /// The object data is malformed or does not hash to its id.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjId, reason: String },

    /// An object exists but is of a different kind than requested.
    #[error("object {id} is a {actual}, expected a {expected}")]
    UnexpectedType {
        id: ObjId,
        expected: ObjType,
        actual: ObjType,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("hashing failed: {0}")]
    Hasher(#[from] HasherError),

    /// No content type is registered for a payload discriminator.
    #[error("unknown content type: {0}")]
    UnknownContentType(String),

    /// A content type with this payload or name is already registered.
    #[error("duplicate content type: {0}")]
    DuplicateContentType(String),

    /// A content value could not be encoded or decoded by its content type.
    #[error("invalid content for {content_type}: {reason}")]
    InvalidContent {
        content_type: String,
        reason: String,
    },

    /// Invalid store configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl StoreError {
    /// Returns `true` if the failure is transient and the operation may be
    /// retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendLimitExceeded(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
