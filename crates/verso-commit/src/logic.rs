//! Commit construction and publication.

use std::collections::BTreeSet;

use tracing::debug;
use verso_diff::{diff_commits, KeyDiff};
use verso_index::{IndexesLogic, StoreIndex};
use verso_refs::{NamedRef, RefError, Reference, ReferenceLogic};
use verso_store::{CommitMeta, CommitObj, CommitOp, Obj, Persist};
use verso_types::{ContentKey, ObjId};

use crate::conflict::{fail_on_conflict, CommitConflict, ConflictHandler, ConflictResolution};
use crate::error::{CommitError, CommitResult};
use crate::ops::{CommitOperation, CreateCommit};

/// A commit that has been built but not necessarily stored or published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltCommit {
    pub commit: CommitObj,
    /// Index segments the commit refers to.
    pub segments: Vec<Obj>,
}

impl BuiltCommit {
    /// `true` if the commit changes no key.
    pub fn is_empty(&self) -> bool {
        self.commit.is_empty_commit()
    }
}

/// Builds, stores and publishes commits.
pub struct CommitLogic<'a> {
    persist: &'a dyn Persist,
}

impl<'a> CommitLogic<'a> {
    pub fn new(persist: &'a dyn Persist) -> Self {
        Self { persist }
    }

    /// Fetch a commit. [`ObjId::EMPTY`] is the empty state and yields `None`.
    pub fn fetch_commit(&self, id: ObjId) -> CommitResult<Option<CommitObj>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.persist.fetch_commit(&id)?))
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Build the commit described by `create` without storing anything.
    ///
    /// Every operation is checked against the parent's key state; conflicts
    /// go to `handler`. If any conflict is left unresolved the commit is not
    /// built and all such conflicts are returned together.
    pub fn build_commit<H>(&self, create: &CreateCommit, handler: &mut H) -> CommitResult<BuiltCommit>
    where
        H: ConflictHandler + ?Sized,
    {
        let mut seen = BTreeSet::new();
        for op in &create.operations {
            if !seen.insert(op.key()) {
                return Err(CommitError::DuplicateKey(op.key().clone()));
            }
        }

        let parent = self.fetch_commit(create.parent)?;
        let indexes = IndexesLogic::new(self.persist);
        let keys: Vec<ContentKey> = create.operations.iter().map(|op| op.key().clone()).collect();
        let existing = indexes.lookup_many(parent.as_ref(), &keys)?;

        let mut mutations = StoreIndex::new();
        let mut conflicts = Vec::new();
        for op in &create.operations {
            let current = existing.get(op.key());
            if let Some(conflict) = CommitConflict::check(op, current) {
                match handler.on_conflict(&conflict) {
                    ConflictResolution::Conflict => {
                        conflicts.push(conflict);
                        continue;
                    }
                    ConflictResolution::Drop => continue,
                    ConflictResolution::Ignore => {}
                }
            }
            match op {
                CommitOperation::Put {
                    key,
                    payload,
                    value,
                    ..
                } => {
                    mutations.put(key.clone(), CommitOp::add(*payload, *value));
                }
                CommitOperation::Delete { key, .. } => {
                    // Nothing to remove if the key is already gone.
                    if let Some(current) = current {
                        mutations.put(key.clone(), CommitOp::remove(current.payload));
                    }
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(CommitError::Conflicts(conflicts));
        }

        let index = indexes.build_commit_index(parent.as_ref(), &mutations)?;
        let (seq, tail) = match &parent {
            Some(p) => {
                let mut tail = Vec::with_capacity(p.tail.len() + 1);
                tail.push(p.id);
                tail.extend(&p.tail);
                tail.truncate(self.persist.config().parents_per_commit.max(1));
                (p.seq + 1, tail)
            }
            None => (1, Vec::new()),
        };
        let commit = CommitObj::new(
            seq,
            tail,
            create.secondary_parents.clone(),
            create.meta.clone(),
            index.incremental_index,
            index.reference_index,
        )?;
        Ok(BuiltCommit {
            commit,
            segments: index.segments,
        })
    }

    /// Store a built commit and its segments. Returns `false` if an identical
    /// commit already existed.
    pub fn store_commit(&self, built: &BuiltCommit) -> CommitResult<bool> {
        if !built.segments.is_empty() {
            self.persist.store_many(&built.segments)?;
        }
        Ok(self.persist.store(&Obj::from(built.commit.clone()))?)
    }

    /// Store `built` and move `reference` to it with one compare-and-swap.
    pub fn publish(&self, reference: &Reference, built: &BuiltCommit) -> CommitResult<Reference> {
        self.store_commit(built)?;
        Ok(ReferenceLogic::new(self.persist).assign(reference, built.commit.id)?)
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Commit `operations` to `branch`.
    ///
    /// With an `expected_hash` the branch must currently point there. The new
    /// commit's parent is the head read here; if another writer moves the
    /// branch before the compare-and-swap, the commit fails with a reference
    /// conflict. Nothing is retried.
    pub fn commit(
        &self,
        branch: &NamedRef,
        expected_hash: Option<ObjId>,
        meta: CommitMeta,
        operations: Vec<CommitOperation>,
    ) -> CommitResult<CommitObj> {
        if !branch.is_branch() {
            return Err(CommitError::NotABranch(branch.clone()));
        }
        let reference = ReferenceLogic::new(self.persist).get(branch)?;
        check_expected_hash(&reference, expected_hash)?;

        let create = CreateCommit::new(reference.pointer, meta).with_operations(operations);
        let built = self.build_commit(&create, &mut fail_on_conflict)?;
        self.publish(&reference, &built)?;
        debug!(
            branch = %branch,
            commit = %built.commit.id.short_hex(),
            parent = %reference.pointer.short_hex(),
            operations = create.operations.len(),
            "committed"
        );
        Ok(built.commit)
    }

    /// Keys that differ between two commits.
    pub fn diff(&self, from: ObjId, to: ObjId) -> CommitResult<KeyDiff> {
        let from = self.fetch_commit(from)?;
        let to = self.fetch_commit(to)?;
        Ok(diff_commits(self.persist, from.as_ref(), to.as_ref())?)
    }
}

/// Fail with a reference conflict if `reference` is not at `expected`.
pub fn check_expected_hash(reference: &Reference, expected: Option<ObjId>) -> CommitResult<()> {
    match expected {
        Some(expected) if expected != reference.pointer => Err(RefError::Conflict {
            name: reference.named.to_string(),
            expected,
            actual: reference.pointer,
        }
        .into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use proptest::prelude::*;
    use verso_store::{InMemoryPersist, StoreConfig};

    use super::*;
    use crate::conflict::ConflictType;
    use crate::ops::Expected;

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn val(s: &str) -> ObjId {
        ObjId::from_bytes(s.as_bytes())
    }

    fn main_branch(persist: &InMemoryPersist) -> NamedRef {
        let main = NamedRef::branch("main");
        ReferenceLogic::new(persist).create(&main, ObjId::EMPTY).unwrap();
        main
    }

    fn value_at(persist: &InMemoryPersist, commit: ObjId, k: &str) -> Option<ObjId> {
        let commit = CommitLogic::new(persist).fetch_commit(commit).unwrap();
        IndexesLogic::new(persist)
            .lookup(commit.as_ref(), &key(k))
            .unwrap()
            .and_then(|op| op.value)
    }

    fn meta(msg: &str) -> CommitMeta {
        CommitMeta::new("tester", msg)
    }

    #[test]
    fn put_then_update_with_expected_hash() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);

        let h1 = logic
            .commit(&main, None, meta("c1"), vec![CommitOperation::put(key("k1"), 1, val("v1"))])
            .unwrap();
        let h2 = logic
            .commit(
                &main,
                Some(h1.id),
                meta("c2"),
                vec![CommitOperation::put(key("k1"), 1, val("v2"))],
            )
            .unwrap();

        assert_eq!(h1.seq, 1);
        assert_eq!(h2.seq, 2);
        assert_eq!(h2.parent(), h1.id);
        assert_eq!(value_at(&persist, h2.id, "k1"), Some(val("v2")));
        assert_eq!(value_at(&persist, h1.id, "k1"), Some(val("v1")));
        let head = ReferenceLogic::new(&persist).get(&main).unwrap();
        assert_eq!(head.pointer, h2.id);
    }

    #[test]
    fn stale_expected_hash_is_a_reference_conflict() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);
        let h1 = logic
            .commit(&main, None, meta("c1"), vec![CommitOperation::put(key("a"), 1, val("1"))])
            .unwrap();
        logic
            .commit(&main, None, meta("c2"), vec![CommitOperation::put(key("b"), 1, val("2"))])
            .unwrap();

        let err = logic
            .commit(&main, Some(h1.id), meta("c3"), vec![CommitOperation::put(key("c"), 1, val("3"))])
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Ref(RefError::Conflict { expected, .. }) if expected == h1.id
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn conflicts_name_every_offending_key() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);
        logic
            .commit(&main, None, meta("c1"), vec![CommitOperation::put(key("a"), 1, val("1"))])
            .unwrap();

        let err = logic
            .commit(
                &main,
                None,
                meta("bad"),
                vec![
                    CommitOperation::put(key("a"), 1, val("x")).expecting(Expected::Absent),
                    CommitOperation::put(key("b"), 1, val("y")).expecting(Expected::Value(val("?"))),
                    CommitOperation::put(key("c"), 1, val("z")),
                ],
            )
            .unwrap_err();
        let CommitError::Conflicts(conflicts) = err else {
            panic!("expected conflicts");
        };
        let found: Vec<(String, ConflictType)> = conflicts
            .iter()
            .map(|c| (c.key.to_string(), c.conflict_type))
            .collect();
        assert_eq!(
            found,
            vec![
                ("a".to_string(), ConflictType::KeyExists),
                ("b".to_string(), ConflictType::KeyDoesNotExist),
            ]
        );
        let head = ReferenceLogic::new(&persist).get(&main).unwrap();
        assert_eq!(value_at(&persist, head.pointer, "c"), None);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let err = CommitLogic::new(&persist)
            .commit(
                &main,
                None,
                meta("dup"),
                vec![
                    CommitOperation::put(key("a"), 1, val("1")),
                    CommitOperation::delete(key("a")),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, CommitError::DuplicateKey(k) if k == key("a")));
    }

    #[test]
    fn commits_only_on_branches() {
        let persist = InMemoryPersist::default();
        ReferenceLogic::new(&persist)
            .create(&NamedRef::tag("v1"), ObjId::EMPTY)
            .unwrap();
        let err = CommitLogic::new(&persist)
            .commit(&NamedRef::tag("v1"), None, meta("m"), vec![])
            .unwrap_err();
        assert!(matches!(err, CommitError::NotABranch(_)));
    }

    #[test]
    fn handler_can_ignore_or_drop() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);
        let h1 = logic
            .commit(
                &main,
                None,
                meta("c1"),
                vec![
                    CommitOperation::put(key("keep"), 1, val("old")),
                    CommitOperation::put(key("force"), 1, val("old")),
                ],
            )
            .unwrap();

        let create = CreateCommit::new(h1.id, meta("c2")).with_operations([
            CommitOperation::put(key("keep"), 1, val("new")).expecting(Expected::Absent),
            CommitOperation::put(key("force"), 1, val("new")).expecting(Expected::Absent),
        ]);
        let mut handler = |c: &CommitConflict| {
            if c.key == key("keep") {
                ConflictResolution::Drop
            } else {
                ConflictResolution::Ignore
            }
        };
        let built = logic.build_commit(&create, &mut handler).unwrap();
        logic.store_commit(&built).unwrap();
        assert_eq!(value_at(&persist, built.commit.id, "keep"), Some(val("old")));
        assert_eq!(value_at(&persist, built.commit.id, "force"), Some(val("new")));
    }

    #[test]
    fn delete_removes_key() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);
        logic
            .commit(&main, None, meta("c1"), vec![CommitOperation::put(key("a"), 1, val("1"))])
            .unwrap();
        let h2 = logic
            .commit(&main, None, meta("c2"), vec![CommitOperation::delete(key("a"))])
            .unwrap();
        assert_eq!(value_at(&persist, h2.id, "a"), None);
        let err = logic
            .commit(&main, None, meta("c3"), vec![CommitOperation::delete(key("a"))])
            .unwrap_err();
        assert!(matches!(err, CommitError::Conflicts(_)));
    }

    #[test]
    fn empty_commit_is_allowed() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let commit = CommitLogic::new(&persist)
            .commit(&main, None, meta("nothing"), vec![])
            .unwrap();
        assert!(commit.is_empty_commit());
    }

    #[test]
    fn tail_is_bounded() {
        let persist = InMemoryPersist::new(StoreConfig::default().with_parents_per_commit(3));
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);
        let mut last = None;
        for i in 0..6 {
            last = Some(
                logic
                    .commit(&main, None, meta(&format!("c{i}")), vec![])
                    .unwrap(),
            );
        }
        let last = last.unwrap();
        assert_eq!(last.tail.len(), 3);
        assert_eq!(last.seq, 6);
    }

    #[test]
    fn diff_between_heads() {
        let persist = InMemoryPersist::default();
        let main = main_branch(&persist);
        let logic = CommitLogic::new(&persist);
        let h1 = logic
            .commit(&main, None, meta("c1"), vec![CommitOperation::put(key("a"), 1, val("1"))])
            .unwrap();
        let h2 = logic
            .commit(
                &main,
                None,
                meta("c2"),
                vec![
                    CommitOperation::put(key("a"), 1, val("2")),
                    CommitOperation::put(key("b"), 1, val("3")),
                ],
            )
            .unwrap();
        let diff = logic.diff(h1.id, h2.id).unwrap();
        assert_eq!(diff.additions(), 1);
        assert_eq!(diff.modifications(), 1);
        assert_eq!(logic.diff(ObjId::EMPTY, h1.id).unwrap().additions(), 1);
    }

    #[test]
    fn concurrent_commits_from_same_head_publish_once() {
        let persist = Arc::new(InMemoryPersist::default());
        let main = main_branch(&persist);
        let head = ReferenceLogic::new(&*persist).get(&main).unwrap().pointer;
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let persist = Arc::clone(&persist);
                let barrier = Arc::clone(&barrier);
                let main = main.clone();
                thread::spawn(move || {
                    barrier.wait();
                    CommitLogic::new(&*persist).commit(
                        &main,
                        Some(head),
                        meta(&format!("w{i}")),
                        vec![CommitOperation::put(key("k"), 1, val(&format!("v{i}")))],
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<&CommitObj> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, CommitError::Ref(RefError::Conflict { .. })));
            }
        }
        let current = ReferenceLogic::new(&*persist).get(&main).unwrap();
        assert_eq!(current.pointer, winners[0].id);
    }

    fn history_strategy() -> impl Strategy<Value = Vec<Vec<(u8, Option<u8>)>>> {
        prop::collection::vec(
            prop::collection::btree_map(0u8..12, prop::option::of(0u8..4), 0..5)
                .prop_map(|m| m.into_iter().collect()),
            1..25,
        )
    }

    proptest! {
        #[test]
        fn values_match_history_replay(history in history_strategy()) {
            let config = StoreConfig::default()
                .with_incremental_index_distance(4)
                .with_max_segment_bytes(200);
            let persist = InMemoryPersist::new(config);
            let main = main_branch(&persist);
            let logic = CommitLogic::new(&persist);
            let mut oracle = std::collections::BTreeMap::new();
            let mut head = ObjId::EMPTY;
            for (i, step) in history.iter().enumerate() {
                let mut ops = Vec::new();
                for (k, v) in step {
                    let k = key(&format!("k{k}"));
                    match v {
                        Some(v) => {
                            ops.push(CommitOperation::put(k.clone(), 1, val(&format!("v{v}"))));
                            oracle.insert(k, val(&format!("v{v}")));
                        }
                        None if oracle.contains_key(&k) => {
                            ops.push(CommitOperation::delete(k.clone()));
                            oracle.remove(&k);
                        }
                        None => {}
                    }
                }
                head = logic.commit(&main, None, meta(&format!("c{i}")), ops).unwrap().id;
            }
            for k in 0u8..12 {
                let name = format!("k{k}");
                prop_assert_eq!(value_at(&persist, head, &name), oracle.get(&key(&name)).copied());
            }
        }
    }
}
