//! Per-key conflicts and how to resolve them.

use std::fmt;

use serde::{Deserialize, Serialize};
use verso_store::CommitOp;
use verso_types::ContentKey;

use crate::ops::{CommitOperation, Expected};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictType {
    /// The key was expected to be absent but exists.
    KeyExists,
    /// The key was expected to exist but does not.
    KeyDoesNotExist,
    /// The key exists with a different content type.
    PayloadDiffers,
    /// The key exists with a different value.
    ValueDiffers,
}

/// An operation whose expectation does not match the parent commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitConflict {
    pub key: ContentKey,
    pub conflict_type: ConflictType,
    /// State of the key in the parent commit.
    pub existing: Option<CommitOp>,
    pub op: CommitOperation,
}

impl CommitConflict {
    /// Check `op` against the key's live state in the parent. `None` if the
    /// operation may proceed.
    pub fn check(op: &CommitOperation, existing: Option<&CommitOp>) -> Option<Self> {
        let conflict_type = match (op, op.expected(), existing) {
            (CommitOperation::Delete { .. }, _, None) => Some(ConflictType::KeyDoesNotExist),
            (_, Expected::Any, _) => None,
            (CommitOperation::Put { .. }, Expected::Absent, Some(_)) => {
                Some(ConflictType::KeyExists)
            }
            (_, Expected::Absent, _) => None,
            (_, Expected::Value(_), None) => Some(ConflictType::KeyDoesNotExist),
            (op, Expected::Value(value), Some(current)) => {
                if let CommitOperation::Put { payload, .. } = op {
                    if *payload != current.payload {
                        return Some(Self::new(op, ConflictType::PayloadDiffers, existing));
                    }
                }
                (current.value != Some(value)).then_some(ConflictType::ValueDiffers)
            }
        };
        conflict_type.map(|t| Self::new(op, t, existing))
    }

    fn new(op: &CommitOperation, conflict_type: ConflictType, existing: Option<&CommitOp>) -> Self {
        Self {
            key: op.key().clone(),
            conflict_type,
            existing: existing.cloned(),
            op: op.clone(),
        }
    }
}

impl fmt::Display for CommitConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.conflict_type {
            ConflictType::KeyExists => "key exists",
            ConflictType::KeyDoesNotExist => "key does not exist",
            ConflictType::PayloadDiffers => "payload differs",
            ConflictType::ValueDiffers => "value differs",
        };
        write!(f, "{what}: {}", self.key)
    }
}

/// What to do with a conflicting operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Report the conflict; the commit is not built.
    Conflict,
    /// Apply the operation anyway.
    Ignore,
    /// Leave the key as it is in the parent.
    Drop,
}

/// Decides the fate of each conflicting operation.
pub trait ConflictHandler {
    fn on_conflict(&mut self, conflict: &CommitConflict) -> ConflictResolution;
}

impl<F> ConflictHandler for F
where
    F: FnMut(&CommitConflict) -> ConflictResolution,
{
    fn on_conflict(&mut self, conflict: &CommitConflict) -> ConflictResolution {
        self(conflict)
    }
}

/// The handler plain commits use: every conflict is reported.
pub fn fail_on_conflict(_: &CommitConflict) -> ConflictResolution {
    ConflictResolution::Conflict
}
