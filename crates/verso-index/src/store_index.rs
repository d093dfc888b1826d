//! In-memory sorted key map.

use std::collections::BTreeMap;

use verso_store::{CommitOp, IndexElement};
use verso_types::ContentKey;

/// A sorted mapping from key to key state.
///
/// Used for incremental indexes under construction, for complete indexes
/// read back from segments, and by merge and diff to compare key sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreIndex {
    entries: BTreeMap<ContentKey, CommitOp>,
}

impl StoreIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from index elements. Later elements for the same key win.
    pub fn from_elements<'a>(elements: impl IntoIterator<Item = &'a IndexElement>) -> Self {
        let mut index = Self::new();
        for element in elements {
            index.put(element.key.clone(), element.op.clone());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The state of `key`, including tombstones.
    pub fn get(&self, key: &ContentKey) -> Option<&CommitOp> {
        self.entries.get(key)
    }

    /// Set the state of a key, replacing any earlier state.
    pub fn put(&mut self, key: ContentKey, op: CommitOp) -> Option<CommitOp> {
        self.entries.insert(key, op)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContentKey, &CommitOp)> {
        self.entries.iter()
    }

    /// Live entries only, in key order.
    pub fn live(&self) -> impl Iterator<Item = (&ContentKey, &CommitOp)> {
        self.entries.iter().filter(|(_, op)| op.is_add())
    }

    /// Apply another index on top of this one: live entries overwrite,
    /// tombstones delete.
    pub fn apply(&mut self, delta: &StoreIndex) {
        for (key, op) in delta.iter() {
            if op.is_add() {
                self.entries.insert(key.clone(), op.clone());
            } else {
                self.entries.remove(key);
            }
        }
    }

    /// Convert to sorted index elements, marking each with `current`.
    pub fn to_elements(&self, current: bool) -> Vec<IndexElement> {
        self.entries
            .iter()
            .map(|(key, op)| IndexElement::new(key.clone(), op.clone(), current))
            .collect()
    }
}

impl FromIterator<(ContentKey, CommitOp)> for StoreIndex {
    fn from_iter<I: IntoIterator<Item = (ContentKey, CommitOp)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
