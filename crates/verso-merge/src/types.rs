//! Merge options and the merge report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use verso_commit::ConflictType;
use verso_refs::NamedRef;
use verso_store::CommitMeta;
use verso_types::{ContentKey, ObjId};

/// How to treat a key both sides changed differently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeBehavior {
    /// Report a conflict.
    #[default]
    Normal,
    /// Take the source's state.
    Force,
    /// Keep the target's state.
    Drop,
}

/// Whether a merge produces one commit or one per source commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    #[default]
    Squash,
    Individual,
}

/// The state a pre-resolved key should end up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolved {
    Put { payload: u8, value: ObjId },
    Delete,
}

/// A caller's decision for one key, valid only while the target holds
/// `expected_target` (`None` meaning the key is absent there).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub expected_target: Option<ObjId>,
    pub resolved: Resolved,
}

/// Options shared by merge and transplant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Ignored by transplant, which always replays commit by commit.
    pub mode: MergeMode,
    pub default_behavior: MergeBehavior,
    pub key_behaviors: BTreeMap<ContentKey, MergeBehavior>,
    pub resolutions: BTreeMap<ContentKey, Resolution>,
    /// The target must currently point here.
    pub expected_hash: Option<ObjId>,
    pub dry_run: bool,
    /// Metadata for a squash commit. Replayed commits keep their own.
    pub meta: Option<CommitMeta>,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_default_behavior(mut self, behavior: MergeBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    pub fn with_key_behavior(mut self, key: ContentKey, behavior: MergeBehavior) -> Self {
        self.key_behaviors.insert(key, behavior);
        self
    }

    pub fn with_resolution(
        mut self,
        key: ContentKey,
        expected_target: Option<ObjId>,
        resolved: Resolved,
    ) -> Self {
        self.resolutions.insert(
            key,
            Resolution {
                expected_target,
                resolved,
            },
        );
        self
    }

    pub fn with_expected_hash(mut self, hash: ObjId) -> Self {
        self.expected_hash = Some(hash);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_meta(mut self, meta: CommitMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn behavior_for(&self, key: &ContentKey) -> MergeBehavior {
        self.key_behaviors
            .get(key)
            .copied()
            .unwrap_or(self.default_behavior)
    }
}

/// Why a key could not be merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConflict {
    pub conflict_type: ConflictType,
    /// Value on the target, `None` if absent.
    pub target: Option<ObjId>,
    /// Value the source wants, `None` for a delete.
    pub source: Option<ObjId>,
}

/// The decision taken for one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDetails {
    pub behavior: MergeBehavior,
    pub conflict: Option<KeyConflict>,
}

impl KeyDetails {
    pub fn is_conflict(&self) -> bool {
        self.conflict.is_some()
    }
}

/// Report of a merge or transplant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub target_branch: NamedRef,
    /// Head of the target when the operation read it.
    pub effective_target_hash: ObjId,
    /// The hash the caller expected the target at, if any.
    pub expected_hash: Option<ObjId>,
    /// Only set by merge.
    pub common_ancestor: Option<ObjId>,
    /// Head of the target afterwards; `None` if nothing was applied.
    pub resultant_target_hash: Option<ObjId>,
    /// Source commits considered, oldest first.
    pub source_commits: Vec<ObjId>,
    /// Commits written to the target, oldest first.
    pub created_commits: Vec<ObjId>,
    pub was_applied: bool,
    pub was_successful: bool,
    /// Every key the operation touched, in key order.
    pub details: BTreeMap<ContentKey, KeyDetails>,
}

impl MergeResult {
    pub(crate) fn new(target_branch: NamedRef, head: ObjId, expected_hash: Option<ObjId>) -> Self {
        Self {
            target_branch,
            effective_target_hash: head,
            expected_hash,
            common_ancestor: None,
            resultant_target_hash: None,
            source_commits: Vec::new(),
            created_commits: Vec::new(),
            was_applied: false,
            was_successful: false,
            details: BTreeMap::new(),
        }
    }

    /// Keys with unresolved conflicts.
    pub fn conflicts(&self) -> impl Iterator<Item = (&ContentKey, &KeyConflict)> {
        self.details
            .iter()
            .filter_map(|(key, d)| d.conflict.as_ref().map(|c| (key, c)))
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicts().next().is_some()
    }
}
