//! Commit input: key operations and their expectations.

use serde::{Deserialize, Serialize};
use verso_store::CommitMeta;
use verso_types::{ContentKey, ObjId};

/// What the caller believes about a key before the commit applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expected {
    /// No check.
    #[default]
    Any,
    /// The key must not exist.
    Absent,
    /// The key must exist with this value (and the operation's payload).
    Value(ObjId),
}

/// One key operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOperation {
    /// Point `key` at a stored value of content type `payload`.
    Put {
        key: ContentKey,
        payload: u8,
        value: ObjId,
        expected: Expected,
    },
    /// Remove `key`. The key must exist.
    Delete { key: ContentKey, expected: Expected },
}

impl CommitOperation {
    pub fn put(key: ContentKey, payload: u8, value: ObjId) -> Self {
        Self::Put {
            key,
            payload,
            value,
            expected: Expected::Any,
        }
    }

    pub fn delete(key: ContentKey) -> Self {
        Self::Delete {
            key,
            expected: Expected::Any,
        }
    }

    /// Attach an expectation.
    pub fn expecting(mut self, expectation: Expected) -> Self {
        match &mut self {
            Self::Put { expected, .. } | Self::Delete { expected, .. } => *expected = expectation,
        }
        self
    }

    pub fn key(&self) -> &ContentKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    pub fn expected(&self) -> Expected {
        match self {
            Self::Put { expected, .. } | Self::Delete { expected, .. } => *expected,
        }
    }
}

/// Everything needed to build a commit on top of `parent`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommit {
    /// First parent; [`ObjId::EMPTY`] for the first commit of a branch.
    pub parent: ObjId,
    /// Merge parents.
    pub secondary_parents: Vec<ObjId>,
    pub meta: CommitMeta,
    pub operations: Vec<CommitOperation>,
}

impl CreateCommit {
    pub fn new(parent: ObjId, meta: CommitMeta) -> Self {
        Self {
            parent,
            secondary_parents: Vec::new(),
            meta,
            operations: Vec::new(),
        }
    }

    pub fn with_operation(mut self, op: CommitOperation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn with_operations(mut self, ops: impl IntoIterator<Item = CommitOperation>) -> Self {
        self.operations.extend(ops);
        self
    }

    /// Record `id` as a merge parent.
    pub fn merged_from(mut self, id: ObjId) -> Self {
        self.secondary_parents.push(id);
        self
    }
}
