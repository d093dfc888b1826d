//! Key-level diff: compare the key sets of two commits.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use verso_index::{IndexesLogic, StoreIndex};
use verso_store::{CommitObj, CommitOp, Persist};
use verso_types::ContentKey;

use crate::error::DiffResult;

/// The result of comparing two key sets, ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDiff {
    pub changes: Vec<KeyChange>,
}

impl KeyDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Number of added keys.
    pub fn additions(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, KeyChange::Added { .. }))
            .count()
    }

    /// Number of removed keys.
    pub fn removals(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, KeyChange::Removed { .. }))
            .count()
    }

    /// Number of modified keys.
    pub fn modifications(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, KeyChange::Modified { .. }))
            .count()
    }

    /// The change for `key`, if any.
    pub fn get(&self, key: &ContentKey) -> Option<&KeyChange> {
        self.changes
            .binary_search_by(|c| c.key().cmp(key))
            .ok()
            .map(|i| &self.changes[i])
    }
}

/// A single key change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyChange {
    /// The key exists only on the new side.
    Added { key: ContentKey, new: CommitOp },
    /// The key exists only on the old side.
    Removed { key: ContentKey, old: CommitOp },
    /// The key exists on both sides with different values or types.
    Modified {
        key: ContentKey,
        old: CommitOp,
        new: CommitOp,
    },
}

impl KeyChange {
    pub fn key(&self) -> &ContentKey {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Modified { key, .. } => {
                key
            }
        }
    }

    /// State on the new side, `None` if the key was removed.
    pub fn new_op(&self) -> Option<&CommitOp> {
        match self {
            Self::Added { new, .. } | Self::Modified { new, .. } => Some(new),
            Self::Removed { .. } => None,
        }
    }
}

/// Compute the diff between two complete indexes. Tombstones count as
/// absent keys.
pub fn diff_indexes(old: &StoreIndex, new: &StoreIndex) -> KeyDiff {
    let mut changes = Vec::new();
    let mut old_iter = old.live().peekable();
    let mut new_iter = new.live().peekable();
    loop {
        let ordering = match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };
        match ordering {
            Ordering::Less => {
                if let Some((key, op)) = old_iter.next() {
                    changes.push(KeyChange::Removed {
                        key: key.clone(),
                        old: op.clone(),
                    });
                }
            }
            Ordering::Greater => {
                if let Some((key, op)) = new_iter.next() {
                    changes.push(KeyChange::Added {
                        key: key.clone(),
                        new: op.clone(),
                    });
                }
            }
            Ordering::Equal => {
                if let (Some((key, a)), Some((_, b))) = (old_iter.next(), new_iter.next()) {
                    if a != b {
                        changes.push(KeyChange::Modified {
                            key: key.clone(),
                            old: a.clone(),
                            new: b.clone(),
                        });
                    }
                }
            }
        }
    }
    KeyDiff { changes }
}

/// Compute the diff between the key sets of two commits (`None` is the
/// empty state).
pub fn diff_commits(
    persist: &dyn Persist,
    from: Option<&CommitObj>,
    to: Option<&CommitObj>,
) -> DiffResult<KeyDiff> {
    let logic = IndexesLogic::new(persist);
    let old = logic.complete_index(from)?;
    let new = logic.complete_index(to)?;
    Ok(diff_indexes(&old, &new))
}
