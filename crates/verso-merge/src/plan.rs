//! Per-key decisions shared by merge and transplant.
//!
//! Decisions are made against an in-memory view of the target: its head as
//! read at the start, overlaid with every change already planned. Nothing
//! here touches the backend except for key lookups.

use std::collections::{BTreeMap, BTreeSet};

use verso_commit::{CommitConflict, CommitOperation, ConflictType, Expected};
use verso_diff::{KeyChange, KeyDiff};
use verso_index::IndexesLogic;
use verso_store::content::NAMESPACE;
use verso_store::{CommitMeta, CommitObj, CommitOp};
use verso_types::{ContentKey, ObjId};

use crate::error::MergeOpResult;
use crate::types::{KeyConflict, KeyDetails, MergeBehavior, MergeOptions, Resolved};

/// One key as changed by the source: its state before (`base`) and after
/// (`source`). `None` means absent.
#[derive(Clone, Debug)]
pub(crate) struct SourceChange {
    pub key: ContentKey,
    pub base: Option<CommitOp>,
    pub source: Option<CommitOp>,
}

impl SourceChange {
    pub fn from_diff(diff: KeyDiff) -> Vec<Self> {
        diff.changes
            .into_iter()
            .map(|change| match change {
                KeyChange::Added { key, new } => Self {
                    key,
                    base: None,
                    source: Some(new),
                },
                KeyChange::Removed { key, old } => Self {
                    key,
                    base: Some(old),
                    source: None,
                },
                KeyChange::Modified { key, old, new } => Self {
                    key,
                    base: Some(old),
                    source: Some(new),
                },
            })
            .collect()
    }

    /// The mutations `commit` introduced, each paired with the key's state in
    /// the commit's parent.
    pub fn from_commit(
        indexes: &IndexesLogic<'_>,
        parent: Option<&CommitObj>,
        commit: &CommitObj,
    ) -> MergeOpResult<Vec<Self>> {
        let keys: Vec<ContentKey> = commit.mutations().map(|e| e.key.clone()).collect();
        let mut before = indexes.lookup_many(parent, &keys)?;
        Ok(commit
            .mutations()
            .map(|e| Self {
                key: e.key.clone(),
                base: before.remove(&e.key),
                source: e.op.is_add().then(|| e.op.clone()),
            })
            .collect())
    }
}

/// A commit to be built on the target once every decision is made.
#[derive(Clone, Debug)]
pub(crate) struct PlannedCommit {
    pub meta: CommitMeta,
    pub secondary_parents: Vec<ObjId>,
    pub operations: Vec<CommitOperation>,
}

pub(crate) struct Planner<'a> {
    indexes: IndexesLogic<'a>,
    target_head: Option<&'a CommitObj>,
    options: &'a MergeOptions,
    /// Planned state of every key touched so far.
    overlay: BTreeMap<ContentKey, Option<CommitOp>>,
    resolved: BTreeSet<ContentKey>,
    pub details: BTreeMap<ContentKey, KeyDetails>,
}

impl<'a> Planner<'a> {
    pub fn new(
        indexes: IndexesLogic<'a>,
        target_head: Option<&'a CommitObj>,
        options: &'a MergeOptions,
    ) -> Self {
        Self {
            indexes,
            target_head,
            options,
            overlay: BTreeMap::new(),
            resolved: BTreeSet::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        self.details.values().any(KeyDetails::is_conflict)
    }

    /// Decide every change of one source commit (or one squashed range) and
    /// return the operations to apply to the target.
    pub fn plan(&mut self, changes: Vec<SourceChange>) -> MergeOpResult<Vec<CommitOperation>> {
        let unseen: Vec<ContentKey> = changes
            .iter()
            .filter(|c| !self.overlay.contains_key(&c.key))
            .map(|c| c.key.clone())
            .collect();
        let mut at_head = self.indexes.lookup_many(self.target_head, &unseen)?;
        for key in unseen {
            let state = at_head.remove(&key);
            self.overlay.insert(key, state);
        }

        let mut operations = Vec::new();
        for change in changes {
            let target = self.overlay.get(&change.key).cloned().flatten();
            let (next, details) = self.decide(&change, target.as_ref());
            if let Some(next) = next {
                if let Some(op) = operation(&change.key, target.as_ref(), next.as_ref()) {
                    operations.push(op);
                }
                self.overlay.insert(change.key.clone(), next);
            }
            match self.details.get(&change.key) {
                Some(existing) if existing.is_conflict() => {}
                _ => {
                    self.details.insert(change.key, details);
                }
            }
        }
        Ok(operations)
    }

    /// The state the key should move to (`None`: leave it alone), and the
    /// details to report.
    fn decide(
        &mut self,
        change: &SourceChange,
        target: Option<&CommitOp>,
    ) -> (Option<Option<CommitOp>>, KeyDetails) {
        let behavior = self.options.behavior_for(&change.key);
        let clean = KeyDetails {
            behavior,
            conflict: None,
        };

        if self.resolved.contains(&change.key) {
            return (None, clean);
        }
        if let Some(resolution) = self.options.resolutions.get(&change.key) {
            let current = target.and_then(CommitOp::live_value);
            if resolution.expected_target != current {
                let conflict_type = match (resolution.expected_target, current) {
                    (None, Some(_)) => ConflictType::KeyExists,
                    (Some(_), None) => ConflictType::KeyDoesNotExist,
                    _ => ConflictType::ValueDiffers,
                };
                return (None, conflicted(behavior, conflict_type, current, change));
            }
            self.resolved.insert(change.key.clone());
            let next = match resolution.resolved {
                Resolved::Put { payload, value } => Some(CommitOp::add(payload, value)),
                Resolved::Delete => None,
            };
            return (Some(next), clean);
        }

        if target == change.base.as_ref() {
            return (Some(change.source.clone()), clean);
        }
        if target == change.source.as_ref() {
            return (None, clean);
        }
        if let (Some(t), Some(s)) = (target, change.source.as_ref()) {
            // Namespaces carry no state worth merging; the target's wins.
            if t.payload == NAMESPACE && s.payload == NAMESPACE {
                return (None, clean);
            }
        }

        match behavior {
            MergeBehavior::Normal => {
                let conflict_type = conflict_type(change, target);
                let current = target.and_then(CommitOp::live_value);
                (None, conflicted(behavior, conflict_type, current, change))
            }
            MergeBehavior::Force => (Some(change.source.clone()), clean),
            MergeBehavior::Drop => (None, clean),
        }
    }
}

/// Classify a conflict the way commit logic would if the source's change
/// were applied with the base state as its expectation.
fn conflict_type(change: &SourceChange, target: Option<&CommitOp>) -> ConflictType {
    let expected = match change.base.as_ref().and_then(CommitOp::live_value) {
        Some(value) => Expected::Value(value),
        None => Expected::Absent,
    };
    let op = match &change.source {
        Some(source) => CommitOperation::Put {
            key: change.key.clone(),
            payload: source.payload,
            value: source.value.unwrap_or(ObjId::EMPTY),
            expected,
        },
        None => CommitOperation::Delete {
            key: change.key.clone(),
            expected,
        },
    };
    CommitConflict::check(&op, target)
        .map(|c| c.conflict_type)
        .unwrap_or(ConflictType::ValueDiffers)
}

fn conflicted(
    behavior: MergeBehavior,
    conflict_type: ConflictType,
    target: Option<ObjId>,
    change: &SourceChange,
) -> KeyDetails {
    KeyDetails {
        behavior,
        conflict: Some(KeyConflict {
            conflict_type,
            target,
            source: change.source.as_ref().and_then(CommitOp::live_value),
        }),
    }
}

/// The operation that moves a key from `current` to `next`, if any.
fn operation(
    key: &ContentKey,
    current: Option<&CommitOp>,
    next: Option<&CommitOp>,
) -> Option<CommitOperation> {
    match (current, next) {
        (Some(c), Some(n)) if c == n => None,
        (_, Some(n)) => n
            .live_value()
            .map(|value| CommitOperation::put(key.clone(), n.payload, value)),
        (Some(_), None) => Some(CommitOperation::delete(key.clone())),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_store::InMemoryPersist;

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn add(v: &str) -> Option<CommitOp> {
        Some(CommitOp::add(1, ObjId::from_bytes(v.as_bytes())))
    }

    fn change(k: &str, base: Option<CommitOp>, source: Option<CommitOp>) -> SourceChange {
        SourceChange {
            key: key(k),
            base,
            source,
        }
    }

    /// Plan against an empty target with `target` preloaded into the overlay.
    fn plan_with(
        options: &MergeOptions,
        target: &[(&str, Option<CommitOp>)],
        changes: Vec<SourceChange>,
    ) -> (Vec<CommitOperation>, BTreeMap<ContentKey, KeyDetails>) {
        let persist = InMemoryPersist::default();
        let mut planner = Planner::new(IndexesLogic::new(&persist), None, options);
        for (k, state) in target {
            planner.overlay.insert(key(k), state.clone());
        }
        let ops = planner.plan(changes).unwrap();
        (ops, planner.details)
    }

    #[test]
    fn one_sided_change_is_taken() {
        let (ops, details) = plan_with(
            &MergeOptions::new(),
            &[("a", add("base"))],
            vec![change("a", add("base"), add("source"))],
        );
        assert_eq!(ops.len(), 1);
        assert!(!details[&key("a")].is_conflict());
    }

    #[test]
    fn identical_change_needs_nothing() {
        let (ops, details) = plan_with(
            &MergeOptions::new(),
            &[("a", add("same"))],
            vec![change("a", add("base"), add("same"))],
        );
        assert!(ops.is_empty());
        assert!(!details[&key("a")].is_conflict());
    }

    #[test]
    fn divergent_change_follows_behavior() {
        let target = [("a", add("target"))];
        let changes = || vec![change("a", add("base"), add("source"))];

        let (ops, details) = plan_with(&MergeOptions::new(), &target, changes());
        assert!(ops.is_empty());
        let conflict = details[&key("a")].conflict.clone().unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::ValueDiffers);

        let force = MergeOptions::new().with_default_behavior(MergeBehavior::Force);
        let (ops, details) = plan_with(&force, &target, changes());
        assert_eq!(
            ops,
            vec![CommitOperation::put(key("a"), 1, ObjId::from_bytes(b"source"))]
        );
        assert_eq!(details[&key("a")].behavior, MergeBehavior::Force);

        let drop = MergeOptions::new().with_key_behavior(key("a"), MergeBehavior::Drop);
        let (ops, details) = plan_with(&drop, &target, changes());
        assert!(ops.is_empty());
        assert!(!details[&key("a")].is_conflict());
    }

    #[test]
    fn add_add_conflict_is_key_exists() {
        let (_, details) = plan_with(
            &MergeOptions::new(),
            &[("a", add("target"))],
            vec![change("a", None, add("source"))],
        );
        assert_eq!(
            details[&key("a")].conflict.as_ref().unwrap().conflict_type,
            ConflictType::KeyExists
        );
    }

    #[test]
    fn namespaces_never_conflict() {
        let ns = |v: &str| Some(CommitOp::add(NAMESPACE, ObjId::from_bytes(v.as_bytes())));
        let (ops, details) = plan_with(
            &MergeOptions::new(),
            &[("ns", ns("target"))],
            vec![change("ns", None, ns("source"))],
        );
        assert!(ops.is_empty());
        assert!(!details[&key("ns")].is_conflict());
    }

    #[test]
    fn resolution_checks_target_expectation() {
        let resolved = Resolved::Put {
            payload: 1,
            value: ObjId::from_bytes(b"resolved"),
        };
        let target_value = ObjId::from_bytes(b"target");

        let good = MergeOptions::new().with_resolution(key("a"), Some(target_value), resolved);
        let (ops, details) = plan_with(
            &good,
            &[("a", add("target"))],
            vec![change("a", add("base"), add("source"))],
        );
        assert_eq!(
            ops,
            vec![CommitOperation::put(key("a"), 1, ObjId::from_bytes(b"resolved"))]
        );
        assert!(!details[&key("a")].is_conflict());

        let stale = MergeOptions::new().with_resolution(key("a"), None, resolved);
        let (ops, details) = plan_with(
            &stale,
            &[("a", add("target"))],
            vec![change("a", add("base"), add("source"))],
        );
        assert!(ops.is_empty());
        assert_eq!(
            details[&key("a")].conflict.as_ref().unwrap().conflict_type,
            ConflictType::KeyExists
        );
    }

    #[test]
    fn later_changes_see_planned_state() {
        let (ops, details) = plan_with(
            &MergeOptions::new(),
            &[("a", add("v1"))],
            vec![change("a", add("v1"), add("v2"))],
        );
        assert_eq!(ops.len(), 1);
        assert!(!details[&key("a")].is_conflict());

        let persist = InMemoryPersist::default();
        let options = MergeOptions::new();
        let mut planner = Planner::new(IndexesLogic::new(&persist), None, &options);
        planner.plan(vec![change("a", None, add("v1"))]).unwrap();
        let second = planner.plan(vec![change("a", add("v1"), add("v2"))]).unwrap();
        assert_eq!(second.len(), 1);
        assert!(!planner.has_conflicts());
    }

    #[test]
    fn delete_of_absent_key_is_skipped() {
        let (ops, details) = plan_with(
            &MergeOptions::new(),
            &[],
            vec![change("gone", add("base"), None)],
        );
        assert!(ops.is_empty());
        assert!(!details[&key("gone")].is_conflict());
    }
}
