use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use tracing::debug;
use verso_types::ObjId;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::object::{Obj, RefObj, VersionToken};
use crate::traits::{Persist, RefIter};

/// In-memory persist backend.
///
/// Intended for tests and embedding. Objects are kept in their encoded wire
/// form, so reads return byte-identical content and the optional size limit
/// applies to what a real backend would store. Reference compare-and-swap
/// happens under the write lock.
pub struct InMemoryPersist {
    config: StoreConfig,
    max_obj_size: Option<usize>,
    objects: RwLock<HashMap<ObjId, Vec<u8>>>,
    references: RwLock<BTreeMap<String, RefObj>>,
}

impl InMemoryPersist {
    /// Create a new empty backend.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            max_obj_size: None,
            objects: RwLock::new(HashMap::new()),
            references: RwLock::new(BTreeMap::new()),
        }
    }

    /// Reject objects whose encoded form exceeds `limit` bytes, like a KV
    /// backend with an item-size cap.
    pub fn with_max_obj_size(mut self, limit: usize) -> Self {
        self.max_obj_size = Some(limit);
        self
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// The stored wire form of an object.
    pub fn raw(&self, id: &ObjId) -> Option<Vec<u8>> {
        self.objects.read().expect("lock poisoned").get(id).cloned()
    }
}

impl Default for InMemoryPersist {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Persist for InMemoryPersist {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn config_info(&self) -> String {
        match self.max_obj_size {
            Some(limit) => format!("in-memory (max object size {limit} bytes)"),
            None => "in-memory".to_string(),
        }
    }

    fn fetch(&self, id: &ObjId) -> StoreResult<Obj> {
        let map = self.objects.read().expect("lock poisoned");
        let data = map.get(id).ok_or(StoreError::NotFound(*id))?;
        Obj::decode(*id, data)
    }

    fn store(&self, obj: &Obj) -> StoreResult<bool> {
        let id = obj.id();
        let data = obj.encode()?;
        if let Some(limit) = self.max_obj_size {
            if data.len() > limit {
                return Err(StoreError::ObjTooLarge {
                    id,
                    size: data.len(),
                    limit,
                });
            }
        }
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(&id) {
            return Ok(false);
        }
        debug!(obj = %id.short_hex(), kind = %obj.obj_type(), size = data.len(), "stored object");
        map.insert(id, data);
        Ok(true)
    }

    fn fetch_reference(&self, name: &str) -> StoreResult<Option<RefObj>> {
        let refs = self.references.read().expect("lock poisoned");
        Ok(refs.get(name).cloned())
    }

    fn create_reference(&self, reference: &RefObj) -> StoreResult<bool> {
        let mut refs = self.references.write().expect("lock poisoned");
        if refs.contains_key(&reference.name) {
            return Ok(false);
        }
        refs.insert(reference.name.clone(), reference.clone());
        Ok(true)
    }

    fn update_reference_conditional(
        &self,
        name: &str,
        expected_token: VersionToken,
        new_pointer: ObjId,
        new_token: VersionToken,
    ) -> StoreResult<bool> {
        let mut refs = self.references.write().expect("lock poisoned");
        match refs.get_mut(name) {
            Some(current) if current.token == expected_token => {
                current.pointer = new_pointer;
                current.token = new_token;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_reference(&self, name: &str, expected_token: VersionToken) -> StoreResult<bool> {
        let mut refs = self.references.write().expect("lock poisoned");
        match refs.get(name) {
            Some(current) if current.token == expected_token => {
                refs.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn scan_references(&self) -> StoreResult<RefIter<'_>> {
        let snapshot: Vec<RefObj> = self
            .references
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn erase(&self) -> StoreResult<()> {
        self.objects.write().expect("lock poisoned").clear();
        self.references.write().expect("lock poisoned").clear();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryPersist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPersist")
            .field("object_count", &self.len())
            .field("max_obj_size", &self.max_obj_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::object::*;
    use verso_types::ContentKey;

    fn make_value(data: &[u8]) -> Obj {
        ContentValueObj::new("cid", 1, data.to_vec()).unwrap().into()
    }

    fn make_commit() -> Obj {
        let key = ContentKey::parse("t1").unwrap();
        CommitObj::new(
            1,
            vec![],
            vec![],
            CommitMeta::new("alice", "c1"),
            vec![IndexElement::new(key, CommitOp::add(1, ObjId::from_bytes(b"v")), true)],
            None,
        )
        .unwrap()
        .into()
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    #[test]
    fn store_and_fetch() {
        let persist = InMemoryPersist::default();
        let obj = make_commit();
        assert!(persist.store(&obj).unwrap());
        assert_eq!(persist.fetch(&obj.id()).unwrap(), obj);
        assert_eq!(persist.fetch_commit(&obj.id()).unwrap().seq, 1);
    }

    #[test]
    fn store_is_idempotent() {
        let persist = InMemoryPersist::default();
        let obj = make_value(b"same");
        assert!(persist.store(&obj).unwrap());
        assert!(!persist.store(&obj).unwrap());
        assert_eq!(persist.len(), 1);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let persist = InMemoryPersist::default();
        let id = ObjId::from_bytes(b"missing");
        assert!(matches!(persist.fetch(&id), Err(StoreError::NotFound(x)) if x == id));
    }

    #[test]
    fn fetch_many_aligns_with_input() {
        let persist = InMemoryPersist::default();
        let a = make_value(b"a");
        let b = make_value(b"b");
        persist.store_many(&[a.clone(), b.clone()]).unwrap();
        let missing = ObjId::from_bytes(b"nope");
        let fetched = persist.fetch_many(&[b.id(), missing, a.id()]).unwrap();
        assert_eq!(fetched, vec![Some(b), None, Some(a)]);
    }

    #[test]
    fn typed_fetch_checks_kind() {
        let persist = InMemoryPersist::default();
        let value = make_value(b"v");
        persist.store(&value).unwrap();
        assert!(matches!(
            persist.fetch_commit(&value.id()),
            Err(StoreError::UnexpectedType { .. })
        ));
        assert!(persist.fetch_value(&value.id()).is_ok());
    }

    #[test]
    fn fetch_commits_reports_all_missing() {
        let persist = InMemoryPersist::default();
        let a = ObjId::from_bytes(b"a");
        let b = ObjId::from_bytes(b"b");
        match persist.fetch_commits(&[a, b]) {
            Err(StoreError::NotFoundMany(ids)) => assert_eq!(ids, vec![a, b]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn max_obj_size_rejects_large_objects() {
        let persist = InMemoryPersist::default().with_max_obj_size(64);
        let big = make_value(&[7u8; 256]);
        assert!(matches!(
            persist.store(&big),
            Err(StoreError::ObjTooLarge { limit: 64, .. })
        ));
        assert!(persist.is_empty());
        assert!(persist.store(&make_value(b"ok")).unwrap());
    }

    #[test]
    fn stored_bytes_never_change() {
        let persist = InMemoryPersist::default();
        let obj = make_commit();
        persist.store(&obj).unwrap();
        let first = persist.raw(&obj.id()).unwrap();
        persist.store(&obj).unwrap();
        for _ in 0..3 {
            assert_eq!(persist.raw(&obj.id()).unwrap(), first);
            assert_eq!(persist.fetch(&obj.id()).unwrap().encode().unwrap(), first);
        }
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    #[test]
    fn create_reference_fails_on_duplicate() {
        let persist = InMemoryPersist::default();
        let r = RefObj::new("main", ObjId::EMPTY);
        assert!(persist.create_reference(&r).unwrap());
        assert!(!persist.create_reference(&RefObj::new("main", ObjId::EMPTY)).unwrap());
        assert_eq!(persist.fetch_reference("main").unwrap(), Some(r));
    }

    #[test]
    fn conditional_update_checks_token() {
        let persist = InMemoryPersist::default();
        let r = RefObj::new("main", ObjId::EMPTY);
        persist.create_reference(&r).unwrap();
        let target = ObjId::from_bytes(b"c1");
        let t1 = VersionToken::random();
        assert!(!persist
            .update_reference_conditional("main", VersionToken(r.token.0 ^ 1), target, t1)
            .unwrap());
        assert!(persist
            .update_reference_conditional("main", r.token, target, t1)
            .unwrap());
        // The old token is now stale.
        assert!(!persist
            .update_reference_conditional("main", r.token, ObjId::EMPTY, VersionToken::random())
            .unwrap());
        let current = persist.fetch_reference("main").unwrap().unwrap();
        assert_eq!(current.pointer, target);
        assert_eq!(current.token, t1);
        assert!(!persist
            .update_reference_conditional("nope", t1, target, t1)
            .unwrap());
    }

    #[test]
    fn delete_reference_checks_token() {
        let persist = InMemoryPersist::default();
        let r = RefObj::new("dev", ObjId::EMPTY);
        persist.create_reference(&r).unwrap();
        assert!(!persist.delete_reference("dev", VersionToken(r.token.0 ^ 1)).unwrap());
        assert!(persist.delete_reference("dev", r.token).unwrap());
        assert!(persist.fetch_reference("dev").unwrap().is_none());
        assert!(!persist.delete_reference("dev", r.token).unwrap());
    }

    #[test]
    fn scan_references_is_sorted() {
        let persist = InMemoryPersist::default();
        for name in ["zeta", "alpha", "mid"] {
            persist.create_reference(&RefObj::new(name, ObjId::EMPTY)).unwrap();
        }
        let names: Vec<String> = persist
            .scan_references()
            .unwrap()
            .map(|r| r.unwrap().name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn concurrent_cas_has_single_winner() {
        for _ in 0..20 {
            let persist = Arc::new(InMemoryPersist::default());
            let r = RefObj::new("main", ObjId::EMPTY);
            persist.create_reference(&r).unwrap();
            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8u8)
                .map(|i| {
                    let persist = Arc::clone(&persist);
                    let barrier = Arc::clone(&barrier);
                    let token = r.token;
                    thread::spawn(move || {
                        barrier.wait();
                        persist
                            .update_reference_conditional(
                                "main",
                                token,
                                ObjId::from_bytes(&[i]),
                                VersionToken::random(),
                            )
                            .unwrap()
                    })
                })
                .collect();
            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
        }
    }

    #[test]
    fn erase_clears_everything() {
        let persist = InMemoryPersist::default();
        persist.store(&make_commit()).unwrap();
        persist.create_reference(&RefObj::new("main", ObjId::EMPTY)).unwrap();
        persist.erase().unwrap();
        assert!(persist.is_empty());
        assert!(persist.fetch_reference("main").unwrap().is_none());
    }
}
