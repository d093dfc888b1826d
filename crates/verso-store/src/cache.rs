use quick_cache::sync::Cache;
use verso_types::ObjId;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::object::{Obj, RefObj, VersionToken};
use crate::traits::{Persist, RefIter};

/// Persist decorator that caches immutable objects.
///
/// Objects never change once stored, so cached entries need no
/// invalidation. References are always read from the wrapped backend.
pub struct CachingPersist<P> {
    inner: P,
    cache: Cache<ObjId, Obj>,
    capacity: usize,
}

impl<P: Persist> CachingPersist<P> {
    /// Wrap `inner` with a cache holding at most `capacity` objects.
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
            capacity,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Number of cached objects.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl<P: Persist> Persist for CachingPersist<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn config(&self) -> &StoreConfig {
        self.inner.config()
    }

    fn config_info(&self) -> String {
        format!(
            "{} (cached, capacity {})",
            self.inner.config_info(),
            self.capacity
        )
    }

    fn setup_schema(&self) -> StoreResult<()> {
        self.inner.setup_schema()
    }

    fn fetch(&self, id: &ObjId) -> StoreResult<Obj> {
        if let Some(obj) = self.cache.get(id) {
            return Ok(obj);
        }
        let obj = self.inner.fetch(id)?;
        self.cache.insert(*id, obj.clone());
        Ok(obj)
    }

    fn fetch_many(&self, ids: &[ObjId]) -> StoreResult<Vec<Option<Obj>>> {
        let mut result: Vec<Option<Obj>> = ids.iter().map(|id| self.cache.get(id)).collect();
        let misses: Vec<ObjId> = ids
            .iter()
            .zip(&result)
            .filter(|(_, hit)| hit.is_none())
            .map(|(id, _)| *id)
            .collect();
        if misses.is_empty() {
            return Ok(result);
        }
        let mut fetched = self.inner.fetch_many(&misses)?.into_iter();
        for slot in result.iter_mut().filter(|slot| slot.is_none()) {
            if let Some(obj) = fetched.next().flatten() {
                self.cache.insert(obj.id(), obj.clone());
                *slot = Some(obj);
            }
        }
        Ok(result)
    }

    fn store(&self, obj: &Obj) -> StoreResult<bool> {
        let stored = self.inner.store(obj)?;
        self.cache.insert(obj.id(), obj.clone());
        Ok(stored)
    }

    fn fetch_reference(&self, name: &str) -> StoreResult<Option<RefObj>> {
        self.inner.fetch_reference(name)
    }

    fn create_reference(&self, reference: &RefObj) -> StoreResult<bool> {
        self.inner.create_reference(reference)
    }

    fn update_reference_conditional(
        &self,
        name: &str,
        expected_token: VersionToken,
        new_pointer: ObjId,
        new_token: VersionToken,
    ) -> StoreResult<bool> {
        self.inner
            .update_reference_conditional(name, expected_token, new_pointer, new_token)
    }

    fn delete_reference(&self, name: &str, expected_token: VersionToken) -> StoreResult<bool> {
        self.inner.delete_reference(name, expected_token)
    }

    fn scan_references(&self) -> StoreResult<RefIter<'_>> {
        self.inner.scan_references()
    }

    fn erase(&self) -> StoreResult<()> {
        self.inner.erase()?;
        self.cache.clear();
        Ok(())
    }
}
