//! The version store: every engine operation behind one handle.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use verso_commit::{check_expected_hash, CommitLogic, CommitOperation, Expected};
use verso_dag::CommitLog;
use verso_diff::KeyDiff;
use verso_index::IndexesLogic;
use verso_merge::{MergeLogic, MergeOptions, MergeResult};
use verso_refs::{retry, NamedRef, RefError, Reference, ReferenceLogic};
use verso_store::{
    CommitMeta, CommitObj, CommitOp, Content, ContentTypeRegistry, InMemoryPersist, Obj, Persist,
    StoreConfig,
};
use verso_types::{ContentKey, ObjId};

use crate::commit::ContentOperation;
use crate::error::{VersionStoreError, VersionStoreResult};
use crate::types::{KeyEntry, Ref};

/// Handle to one repository on one backend.
///
/// Cheap to clone; clones share the backend and the content-type registry.
/// Calls block on backend I/O. Use
/// [`AsyncVersionStore`](crate::AsyncVersionStore) from async code.
#[derive(Clone)]
pub struct VersionStore {
    persist: Arc<dyn Persist>,
    registry: Arc<ContentTypeRegistry>,
}

impl VersionStore {
    pub fn new(persist: Arc<dyn Persist>, registry: Arc<ContentTypeRegistry>) -> Self {
        Self { persist, registry }
    }

    /// A store over a fresh in-memory backend with the built-in content
    /// types.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::new(
            Arc::new(InMemoryPersist::new(config)),
            Arc::new(ContentTypeRegistry::builtin()),
        )
    }

    pub fn persist(&self) -> &dyn Persist {
        &*self.persist
    }

    pub fn registry(&self) -> &ContentTypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &StoreConfig {
        self.persist.config()
    }

    // ---- References ----

    /// Prepare the backend and create `default_branch` at the empty state.
    /// Calling it again on an initialized repository returns the existing
    /// branch.
    pub fn initialize_repo(&self, default_branch: &str) -> VersionStoreResult<Reference> {
        self.persist.setup_schema()?;
        let named = NamedRef::branch(default_branch);
        let refs = ReferenceLogic::new(self.persist());
        match refs.create(&named, ObjId::EMPTY) {
            Ok(reference) => {
                info!(
                    branch = %named,
                    backend = %self.persist.config_info(),
                    "initialized repository"
                );
                Ok(reference)
            }
            Err(RefError::AlreadyExists { .. }) => Ok(refs.get(&named)?),
            Err(e) => Err(e.into()),
        }
    }

    /// [`initialize_repo`](Self::initialize_repo) with the configured
    /// default branch.
    pub fn initialize(&self) -> VersionStoreResult<Reference> {
        let default_branch = self.config().default_branch.clone();
        self.initialize_repo(&default_branch)
    }

    pub fn get_reference(&self, named: &NamedRef) -> VersionStoreResult<Reference> {
        Ok(ReferenceLogic::new(self.persist()).get(named)?)
    }

    /// All branches and tags, sorted by name.
    pub fn list_references(&self) -> VersionStoreResult<Vec<Reference>> {
        ReferenceLogic::new(self.persist())
            .list()?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    pub fn create_reference(
        &self,
        named: &NamedRef,
        pointer: ObjId,
    ) -> VersionStoreResult<Reference> {
        Ok(ReferenceLogic::new(self.persist()).create(named, pointer)?)
    }

    /// Point `named` at `pointer`, provided it still points at
    /// `expected_hash`.
    pub fn assign_reference(
        &self,
        named: &NamedRef,
        expected_hash: ObjId,
        pointer: ObjId,
    ) -> VersionStoreResult<Reference> {
        let refs = ReferenceLogic::new(self.persist());
        let current = refs.get(named)?;
        check_expected_hash(&current, Some(expected_hash))?;
        Ok(refs.assign(&current, pointer)?)
    }

    /// Delete `named`, provided it still points at `expected_hash`.
    pub fn delete_reference(
        &self,
        named: &NamedRef,
        expected_hash: ObjId,
    ) -> VersionStoreResult<()> {
        let refs = ReferenceLogic::new(self.persist());
        let current = refs.get(named)?;
        check_expected_hash(&current, Some(expected_hash))?;
        Ok(refs.delete(&current)?)
    }

    // ---- Commits ----

    /// Apply `operations` to `branch` as one commit and return its id.
    ///
    /// With `expected_hash`, the branch must point exactly there and a
    /// concurrent move fails with [`VersionStoreError::ReferenceConflict`].
    /// Without it, a lost race is retried against the new head under the
    /// configured retry policy. Backend throttling is retried either way,
    /// but only from the head the throttled attempt started at: if that
    /// attempt landed after all, the retry fails with a reference conflict
    /// instead of committing the operations a second time.
    pub fn commit(
        &self,
        branch: &NamedRef,
        expected_hash: Option<ObjId>,
        meta: CommitMeta,
        operations: Vec<ContentOperation>,
    ) -> VersionStoreResult<ObjId> {
        let (values, operations) = self.encode_operations(operations)?;
        let pinned = Cell::new(expected_hash);
        let commit = retry(
            &self.config().retry,
            "commit",
            |e| should_retry(e, &pinned),
            |attempt| {
                if attempt > 1 {
                    debug!(branch = %branch, attempt, "retrying commit");
                }
                let observed = self.observe(branch, &pinned)?;
                let attempted = self.commit_once(branch, observed, &values, &meta, &operations);
                pin_on_throttle(attempted, &pinned, observed)
            },
        )?;
        info!(
            branch = %branch,
            commit = %commit.id.short_hex(),
            seq = commit.seq,
            "committed"
        );
        Ok(commit.id)
    }

    fn commit_once(
        &self,
        branch: &NamedRef,
        head: ObjId,
        values: &[Obj],
        meta: &CommitMeta,
        operations: &[CommitOperation],
    ) -> VersionStoreResult<CommitObj> {
        self.persist.store_many(values)?;
        Ok(CommitLogic::new(self.persist()).commit(
            branch,
            Some(head),
            meta.clone(),
            operations.to_vec(),
        )?)
    }

    /// Head of `branch` for the next attempt: the pinned hash if there is
    /// one, the current pointer otherwise.
    fn observe(
        &self,
        branch: &NamedRef,
        pinned: &Cell<Option<ObjId>>,
    ) -> VersionStoreResult<ObjId> {
        match pinned.get() {
            Some(hash) => Ok(hash),
            None => Ok(self.get_reference(branch)?.pointer),
        }
    }

    /// Encode content through the registry. Values are returned as objects
    /// to store ahead of the commit that references them.
    fn encode_operations(
        &self,
        operations: Vec<ContentOperation>,
    ) -> VersionStoreResult<(Vec<Obj>, Vec<CommitOperation>)> {
        let mut values = Vec::new();
        let mut encoded = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation {
                ContentOperation::Put {
                    key,
                    content,
                    expected,
                } => {
                    let value = self.registry.to_value_obj(&content)?;
                    let expected = match expected {
                        Some(expected) => {
                            Expected::Value(self.registry.to_value_obj(&expected)?.id)
                        }
                        None => Expected::Any,
                    };
                    let put = CommitOperation::put(key, value.payload, value.id);
                    encoded.push(put.expecting(expected));
                    values.push(Obj::Value(value));
                }
                ContentOperation::Delete { key } => encoded.push(CommitOperation::delete(key)),
            }
        }
        Ok((values, encoded))
    }

    // ---- Reads ----

    fn resolve(&self, at: &Ref) -> VersionStoreResult<ObjId> {
        match at {
            Ref::Named(named) => Ok(self.get_reference(named)?.pointer),
            Ref::Hash(id) => Ok(*id),
        }
    }

    fn commit_at(&self, at: &Ref) -> VersionStoreResult<Option<CommitObj>> {
        let id = self.resolve(at)?;
        Ok(CommitLogic::new(self.persist()).fetch_commit(id)?)
    }

    /// Content of `key` at `at`, `None` if the key does not exist there.
    pub fn get_value(
        &self,
        at: impl Into<Ref>,
        key: &ContentKey,
    ) -> VersionStoreResult<Option<Content>> {
        let commit = self.commit_at(&at.into())?;
        match IndexesLogic::new(self.persist()).lookup(commit.as_ref(), key)? {
            Some(op) => {
                let id = live_value(key, &op)?;
                let obj = self.persist.fetch_value(&id)?;
                Ok(Some(self.registry.from_value_obj(&obj)?))
            }
            None => Ok(None),
        }
    }

    /// Contents of several keys at `at`. Keys that do not exist are left
    /// out. Values are fetched in one batch.
    pub fn get_values(
        &self,
        at: impl Into<Ref>,
        keys: &[ContentKey],
    ) -> VersionStoreResult<BTreeMap<ContentKey, Content>> {
        let commit = self.commit_at(&at.into())?;
        let found = IndexesLogic::new(self.persist()).lookup_many(commit.as_ref(), keys)?;
        let entries = found
            .into_iter()
            .map(|(key, op)| live_value(&key, &op).map(|id| (key, id)))
            .collect::<VersionStoreResult<Vec<_>>>()?;
        let ids: Vec<ObjId> = entries.iter().map(|(_, id)| *id).collect();
        let fetched = self.persist.fetch_many(&ids)?;

        let mut values = BTreeMap::new();
        for ((key, id), obj) in entries.into_iter().zip(fetched) {
            let content = match obj {
                Some(Obj::Value(value)) => self.registry.from_value_obj(&value)?,
                Some(other) => {
                    return Err(VersionStoreError::Corrupt(format!(
                        "{id} is a {}, expected a content value",
                        other.obj_type()
                    )))
                }
                None => return Err(VersionStoreError::ObjNotFound(vec![id])),
            };
            values.insert(key, content);
        }
        Ok(values)
    }

    /// Lazy, sorted sequence of every live key at `at`.
    pub fn get_keys(
        &self,
        at: impl Into<Ref>,
    ) -> VersionStoreResult<impl Iterator<Item = VersionStoreResult<KeyEntry>> + '_> {
        let commit = self.commit_at(&at.into())?;
        let keys = IndexesLogic::new(self.persist()).keys(commit.as_ref())?;
        Ok(keys.map(move |item| {
            let (key, op) = item?;
            self.key_entry(key, &op)
        }))
    }

    /// Like [`get_keys`](Self::get_keys), limited to `prefix` and the keys
    /// below it.
    pub fn get_keys_with_prefix(
        &self,
        at: impl Into<Ref>,
        prefix: ContentKey,
    ) -> VersionStoreResult<impl Iterator<Item = VersionStoreResult<KeyEntry>> + '_> {
        let commit = self.commit_at(&at.into())?;
        let keys = IndexesLogic::new(self.persist()).keys_with_prefix(commit.as_ref(), prefix)?;
        Ok(keys.map(move |item| {
            let (key, op) = item?;
            self.key_entry(key, &op)
        }))
    }

    fn key_entry(&self, key: ContentKey, op: &CommitOp) -> VersionStoreResult<KeyEntry> {
        let value = live_value(&key, op)?;
        let content_type = self.registry.name_of(op.payload)?.to_string();
        Ok(KeyEntry {
            key,
            content_type,
            value,
        })
    }

    /// History of `at`, newest first. The log reports its
    /// [`position`](CommitLog::position); pass it back as a hash to page.
    pub fn get_commit_log(&self, at: impl Into<Ref>) -> VersionStoreResult<CommitLog<'_>> {
        let head = self.resolve(&at.into())?;
        Ok(CommitLog::new(self.persist(), head))
    }

    /// Keys that differ between two states.
    pub fn diff(&self, from: impl Into<Ref>, to: impl Into<Ref>) -> VersionStoreResult<KeyDiff> {
        let from = self.resolve(&from.into())?;
        let to = self.resolve(&to.into())?;
        Ok(CommitLogic::new(self.persist()).diff(from, to)?)
    }

    // ---- Merge and transplant ----

    /// Merge `source` into the branch `target`. Without an expected hash in
    /// `options`, a lost race is retried like [`commit`](Self::commit).
    pub fn merge(
        &self,
        source: impl Into<Ref>,
        target: &NamedRef,
        options: &MergeOptions,
    ) -> VersionStoreResult<MergeResult> {
        let source = self.resolve(&source.into())?;
        self.retrying("merge", target, options, |logic, options| {
            Ok(logic.merge(source, target, options)?)
        })
    }

    /// Replay `commits`, in order, onto the branch `target`.
    pub fn transplant(
        &self,
        commits: &[ObjId],
        target: &NamedRef,
        options: &MergeOptions,
    ) -> VersionStoreResult<MergeResult> {
        self.retrying("transplant", target, options, |logic, options| {
            Ok(logic.transplant(commits, target, options)?)
        })
    }

    fn retrying<F>(
        &self,
        operation: &str,
        target: &NamedRef,
        options: &MergeOptions,
        mut op: F,
    ) -> VersionStoreResult<MergeResult>
    where
        F: FnMut(&MergeLogic<'_>, &MergeOptions) -> VersionStoreResult<MergeResult>,
    {
        let logic = MergeLogic::new(self.persist());
        let pinned = Cell::new(options.expected_hash);
        let result = retry(
            &self.config().retry,
            operation,
            |e| should_retry(e, &pinned),
            |_| {
                let observed = self.observe(target, &pinned)?;
                let attempt_options = options.clone().with_expected_hash(observed);
                let attempted = op(&logic, &attempt_options).map(|mut result| {
                    result.expected_hash = options.expected_hash;
                    result
                });
                pin_on_throttle(attempted, &pinned, observed)
            },
        )
        .map_err(|e| match e {
            VersionStoreError::MergeConflict(mut result) => {
                result.expected_hash = options.expected_hash;
                VersionStoreError::MergeConflict(result)
            }
            other => other,
        })?;
        info!(
            operation,
            target = %result.target_branch,
            applied = result.was_applied,
            commits = result.created_commits.len(),
            "finished"
        );
        Ok(result)
    }
}

/// A lost race is retried only while no head is pinned; throttling always is.
fn should_retry(e: &VersionStoreError, pinned: &Cell<Option<ObjId>>) -> bool {
    match e {
        VersionStoreError::ReferenceConflict { .. } => pinned.get().is_none(),
        VersionStoreError::BackendLimitExceeded(_) => true,
        _ => false,
    }
}

/// A throttled attempt may or may not have moved the reference. Later
/// attempts must start from the head this one saw.
fn pin_on_throttle<T>(
    attempted: VersionStoreResult<T>,
    pinned: &Cell<Option<ObjId>>,
    observed: ObjId,
) -> VersionStoreResult<T> {
    if let Err(VersionStoreError::BackendLimitExceeded(_)) = &attempted {
        pinned.set(Some(observed));
    }
    attempted
}

fn live_value(key: &ContentKey, op: &CommitOp) -> VersionStoreResult<ObjId> {
    op.live_value()
        .ok_or_else(|| VersionStoreError::Corrupt(format!("live key {key} has no value")))
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("backend", &self.persist.config_info())
            .field("registry", &self.registry)
            .finish()
    }
}
