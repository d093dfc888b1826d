use verso_types::ObjId;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::object::{
    CommitObj, ContentValueObj, IndexSegmentObj, Obj, ObjType, RefObj, VersionToken,
};

/// Lazy sequence of reference records.
pub type RefIter<'a> = Box<dyn Iterator<Item = StoreResult<RefObj>> + Send + 'a>;

/// Contract every physical backend implements.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once stored. Storing an object whose id already
///   exists is a no-op.
/// - A failed `store` never leaves a partially written object visible.
/// - Reference mutations are atomic compare-and-swaps on the
///   [`VersionToken`]: they either apply fully or return `false`.
/// - Every operation is safe to retry.
pub trait Persist: Send + Sync {
    /// Backend name, for diagnostics.
    fn name(&self) -> &str;

    /// Engine configuration this backend was opened with.
    fn config(&self) -> &StoreConfig;

    /// Human-readable description of the backend's physical settings.
    fn config_info(&self) -> String {
        format!("{} (repository '{}')", self.name(), self.config().repository_id)
    }

    /// Create backend tables or buckets. Idempotent.
    fn setup_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Fetch an object. Fails with [`StoreError::NotFound`] if absent.
    fn fetch(&self, id: &ObjId) -> StoreResult<Obj>;

    /// Fetch several objects; the result is aligned with `ids`, `None` for
    /// misses.
    fn fetch_many(&self, ids: &[ObjId]) -> StoreResult<Vec<Option<Obj>>> {
        ids.iter()
            .map(|id| match self.fetch(id) {
                Ok(obj) => Ok(Some(obj)),
                Err(StoreError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            })
            .collect()
    }

    /// Store an object. Returns `true` if it was newly written, `false` if
    /// an object with the same id already existed.
    ///
    /// Fails with [`StoreError::ObjTooLarge`] if the backend's per-item size
    /// limit is exceeded.
    fn store(&self, obj: &Obj) -> StoreResult<bool>;

    /// Store several objects; the result is aligned with `objs`.
    fn store_many(&self, objs: &[Obj]) -> StoreResult<Vec<bool>> {
        objs.iter().map(|obj| self.store(obj)).collect()
    }

    /// Read a reference record.
    fn fetch_reference(&self, name: &str) -> StoreResult<Option<RefObj>>;

    /// Create a reference. Returns `false` if the name already exists.
    fn create_reference(&self, reference: &RefObj) -> StoreResult<bool>;

    /// Atomically move a reference if its token still equals
    /// `expected_token`. Returns `false` on a token mismatch or a missing
    /// reference.
    fn update_reference_conditional(
        &self,
        name: &str,
        expected_token: VersionToken,
        new_pointer: ObjId,
        new_token: VersionToken,
    ) -> StoreResult<bool>;

    /// Atomically delete a reference if its token still equals
    /// `expected_token`.
    fn delete_reference(&self, name: &str, expected_token: VersionToken) -> StoreResult<bool>;

    /// All references, sorted by name.
    fn scan_references(&self) -> StoreResult<RefIter<'_>>;

    /// Destroy all objects and references. Administrative use only.
    fn erase(&self) -> StoreResult<()>;

    /// Fetch an object that must be a commit.
    fn fetch_commit(&self, id: &ObjId) -> StoreResult<CommitObj> {
        match self.fetch(id)? {
            Obj::Commit(c) => Ok(c),
            other => Err(unexpected(id, ObjType::Commit, &other)),
        }
    }

    /// Fetch several commits, failing if any is missing.
    fn fetch_commits(&self, ids: &[ObjId]) -> StoreResult<Vec<CommitObj>> {
        let fetched = self.fetch_many(ids)?;
        let missing: Vec<ObjId> = ids
            .iter()
            .zip(&fetched)
            .filter(|(_, obj)| obj.is_none())
            .map(|(id, _)| *id)
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::NotFoundMany(missing));
        }
        ids.iter()
            .zip(fetched)
            .map(|(id, obj)| match obj {
                Some(Obj::Commit(c)) => Ok(c),
                Some(other) => Err(unexpected(id, ObjType::Commit, &other)),
                None => Err(StoreError::NotFound(*id)),
            })
            .collect()
    }

    /// Fetch an object that must be a content value.
    fn fetch_value(&self, id: &ObjId) -> StoreResult<ContentValueObj> {
        match self.fetch(id)? {
            Obj::Value(v) => Ok(v),
            other => Err(unexpected(id, ObjType::Value, &other)),
        }
    }

    /// Fetch an object that must be an index segment.
    fn fetch_segment(&self, id: &ObjId) -> StoreResult<IndexSegmentObj> {
        match self.fetch(id)? {
            Obj::IndexSegment(s) => Ok(s),
            other => Err(unexpected(id, ObjType::IndexSegment, &other)),
        }
    }
}

fn unexpected(id: &ObjId, expected: ObjType, actual: &Obj) -> StoreError {
    StoreError::UnexpectedType {
        id: *id,
        expected,
        actual: actual.obj_type(),
    }
}

impl<P: Persist + ?Sized> Persist for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn config(&self) -> &StoreConfig {
        (**self).config()
    }

    fn config_info(&self) -> String {
        (**self).config_info()
    }

    fn setup_schema(&self) -> StoreResult<()> {
        (**self).setup_schema()
    }

    fn fetch(&self, id: &ObjId) -> StoreResult<Obj> {
        (**self).fetch(id)
    }

    fn fetch_many(&self, ids: &[ObjId]) -> StoreResult<Vec<Option<Obj>>> {
        (**self).fetch_many(ids)
    }

    fn store(&self, obj: &Obj) -> StoreResult<bool> {
        (**self).store(obj)
    }

    fn store_many(&self, objs: &[Obj]) -> StoreResult<Vec<bool>> {
        (**self).store_many(objs)
    }

    fn fetch_reference(&self, name: &str) -> StoreResult<Option<RefObj>> {
        (**self).fetch_reference(name)
    }

    fn create_reference(&self, reference: &RefObj) -> StoreResult<bool> {
        (**self).create_reference(reference)
    }

    fn update_reference_conditional(
        &self,
        name: &str,
        expected_token: VersionToken,
        new_pointer: ObjId,
        new_token: VersionToken,
    ) -> StoreResult<bool> {
        (**self).update_reference_conditional(name, expected_token, new_pointer, new_token)
    }

    fn delete_reference(&self, name: &str, expected_token: VersionToken) -> StoreResult<bool> {
        (**self).delete_reference(name, expected_token)
    }

    fn scan_references(&self) -> StoreResult<RefIter<'_>> {
        (**self).scan_references()
    }

    fn erase(&self) -> StoreResult<()> {
        (**self).erase()
    }
}
