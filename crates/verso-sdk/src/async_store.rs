//! Futures over the blocking version store.

use std::collections::BTreeMap;

use verso_diff::KeyDiff;
use verso_merge::{MergeOptions, MergeResult};
use verso_refs::{NamedRef, Reference};
use verso_store::{CommitMeta, CommitObj, Content};
use verso_types::{ContentKey, ObjId};

use crate::commit::ContentOperation;
use crate::error::{VersionStoreError, VersionStoreResult};
use crate::repository::VersionStore;
use crate::types::{KeyEntry, Ref};

/// Runs each [`VersionStore`] call on tokio's blocking pool.
///
/// Lazy sequences (keys, commit log) are collected on the pool before they
/// are returned.
#[derive(Clone, Debug)]
pub struct AsyncVersionStore {
    inner: VersionStore,
}

impl AsyncVersionStore {
    pub fn new(inner: VersionStore) -> Self {
        Self { inner }
    }

    /// The wrapped blocking store.
    pub fn blocking(&self) -> &VersionStore {
        &self.inner
    }

    async fn run<T, F>(&self, call: F) -> VersionStoreResult<T>
    where
        F: FnOnce(&VersionStore) -> VersionStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.inner.clone();
        match tokio::task::spawn_blocking(move || call(&store)).await {
            Ok(result) => result,
            Err(e) => match e.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(_) => Err(VersionStoreError::Cancelled),
            },
        }
    }

    pub async fn initialize_repo(&self, default_branch: &str) -> VersionStoreResult<Reference> {
        let branch = default_branch.to_string();
        self.run(move |s| s.initialize_repo(&branch)).await
    }

    pub async fn initialize(&self) -> VersionStoreResult<Reference> {
        self.run(|s| s.initialize()).await
    }

    pub async fn get_reference(&self, named: NamedRef) -> VersionStoreResult<Reference> {
        self.run(move |s| s.get_reference(&named)).await
    }

    pub async fn list_references(&self) -> VersionStoreResult<Vec<Reference>> {
        self.run(|s| s.list_references()).await
    }

    pub async fn create_reference(
        &self,
        named: NamedRef,
        pointer: ObjId,
    ) -> VersionStoreResult<Reference> {
        self.run(move |s| s.create_reference(&named, pointer)).await
    }

    pub async fn assign_reference(
        &self,
        named: NamedRef,
        expected_hash: ObjId,
        pointer: ObjId,
    ) -> VersionStoreResult<Reference> {
        self.run(move |s| s.assign_reference(&named, expected_hash, pointer))
            .await
    }

    pub async fn delete_reference(
        &self,
        named: NamedRef,
        expected_hash: ObjId,
    ) -> VersionStoreResult<()> {
        self.run(move |s| s.delete_reference(&named, expected_hash))
            .await
    }

    pub async fn commit(
        &self,
        branch: NamedRef,
        expected_hash: Option<ObjId>,
        meta: CommitMeta,
        operations: Vec<ContentOperation>,
    ) -> VersionStoreResult<ObjId> {
        self.run(move |s| s.commit(&branch, expected_hash, meta, operations))
            .await
    }

    pub async fn get_value(
        &self,
        at: impl Into<Ref>,
        key: ContentKey,
    ) -> VersionStoreResult<Option<Content>> {
        let at = at.into();
        self.run(move |s| s.get_value(at, &key)).await
    }

    pub async fn get_values(
        &self,
        at: impl Into<Ref>,
        keys: Vec<ContentKey>,
    ) -> VersionStoreResult<BTreeMap<ContentKey, Content>> {
        let at = at.into();
        self.run(move |s| s.get_values(at, &keys)).await
    }

    pub async fn get_keys(&self, at: impl Into<Ref>) -> VersionStoreResult<Vec<KeyEntry>> {
        let at = at.into();
        self.run(move |s| s.get_keys(at)?.collect()).await
    }

    /// Up to `limit` commits of the history of `at`, newest first.
    pub async fn get_commit_log(
        &self,
        at: impl Into<Ref>,
        limit: usize,
    ) -> VersionStoreResult<Vec<CommitObj>> {
        let at = at.into();
        self.run(move |s| {
            s.get_commit_log(at)?
                .take(limit)
                .map(|c| c.map_err(Into::into))
                .collect()
        })
        .await
    }

    pub async fn diff(
        &self,
        from: impl Into<Ref>,
        to: impl Into<Ref>,
    ) -> VersionStoreResult<KeyDiff> {
        let (from, to) = (from.into(), to.into());
        self.run(move |s| s.diff(from, to)).await
    }

    pub async fn merge(
        &self,
        source: impl Into<Ref>,
        target: NamedRef,
        options: MergeOptions,
    ) -> VersionStoreResult<MergeResult> {
        let source = source.into();
        self.run(move |s| s.merge(source, &target, &options)).await
    }

    pub async fn transplant(
        &self,
        commits: Vec<ObjId>,
        target: NamedRef,
        options: MergeOptions,
    ) -> VersionStoreResult<MergeResult> {
        self.run(move |s| s.transplant(&commits, &target, &options))
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use verso_store::StoreConfig;

    use super::*;

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn async_store() -> AsyncVersionStore {
        AsyncVersionStore::new(VersionStore::in_memory(StoreConfig::default()))
    }

    #[tokio::test]
    async fn commit_and_read_back() {
        let store = async_store();
        let main = store.initialize_repo("main").await.unwrap().named;

        let table = Content::new("ICEBERG_TABLE", json!({ "metadata_location": "s3://t/1" }));
        let h1 = store
            .commit(
                main.clone(),
                Some(ObjId::EMPTY),
                CommitMeta::new("tester", "add t"),
                vec![ContentOperation::put(key("db.t"), table.clone())],
            )
            .await
            .unwrap();

        assert_eq!(store.get_reference(main.clone()).await.unwrap().pointer, h1);
        assert_eq!(store.get_value(h1, key("db.t")).await.unwrap(), Some(table));
        let keys = store.get_keys(main.clone()).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].content_type, "ICEBERG_TABLE");
        let log = store.get_commit_log(main, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].meta.message, "add t");
    }

    #[tokio::test]
    async fn error_kinds_cross_the_pool() {
        let store = async_store();
        store.initialize().await.unwrap();
        let err = store
            .get_reference(NamedRef::branch("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, VersionStoreError::RefNotFound(_)));
    }

    #[tokio::test]
    async fn merge_through_the_pool() {
        let store = async_store();
        let main = store.initialize_repo("main").await.unwrap().named;
        let feature = NamedRef::branch("feature");
        store
            .create_reference(feature.clone(), ObjId::EMPTY)
            .await
            .unwrap();
        let view = Content::new("ICEBERG_VIEW", json!({ "sql": "select 1" }));
        let tip = store
            .commit(
                feature,
                None,
                CommitMeta::new("tester", "add view"),
                vec![ContentOperation::put(key("v"), view)],
            )
            .await
            .unwrap();

        let result = store
            .merge(tip, main.clone(), MergeOptions::new())
            .await
            .unwrap();
        assert!(result.was_applied);
        assert_eq!(result.resultant_target_hash, Some(tip));
        assert_eq!(store.get_reference(main).await.unwrap().pointer, tip);
    }
}
