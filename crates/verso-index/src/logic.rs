//! Index lookup and construction over a persist backend.

use std::collections::BTreeMap;

use tracing::debug;
use verso_store::{
    CommitObj, CommitOp, IndexElement, IndexSegmentObj, IndexStripe, Obj, Persist, SegmentBody,
    StoreError,
};
use verso_types::{ContentKey, ObjId};

use crate::error::{IndexError, IndexResult};
use crate::iter::KeyIter;
use crate::store_index::StoreIndex;

/// The index parts of a commit about to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitIndex {
    pub incremental_index: Vec<IndexElement>,
    pub reference_index: Option<ObjId>,
    /// Segments that must be stored before the commit.
    pub segments: Vec<Obj>,
}

/// Key-index operations. `None` as a commit stands for the empty state.
pub struct IndexesLogic<'a> {
    persist: &'a dyn Persist,
}

impl<'a> IndexesLogic<'a> {
    pub fn new(persist: &'a dyn Persist) -> Self {
        Self { persist }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The live state of `key` at `commit`, or `None` if the key does not
    /// exist there.
    ///
    /// Checks the incremental index first, then binary-searches the
    /// complete index (fetching at most one stripe).
    pub fn lookup(
        &self,
        commit: Option<&CommitObj>,
        key: &ContentKey,
    ) -> IndexResult<Option<CommitOp>> {
        let Some(commit) = commit else {
            return Ok(None);
        };
        if let Some(element) = search(&commit.incremental_index, key) {
            return Ok(element.op.is_add().then(|| element.op.clone()));
        }
        let Some(root) = commit.reference_index else {
            return Ok(None);
        };
        match self.persist.fetch_segment(&root)?.body {
            SegmentBody::Leaf(elements) => Ok(live(search(&elements, key))),
            SegmentBody::Stripes(stripes) => {
                let Some(stripe) = find_stripe(&stripes, key) else {
                    return Ok(None);
                };
                let elements = self.fetch_leaf(&stripe.segment)?;
                Ok(live(search(&elements, key)))
            }
        }
    }

    /// Live states of several keys. Missing keys are absent from the result.
    ///
    /// Stripes needed by more than one key are fetched once, in one batch.
    pub fn lookup_many(
        &self,
        commit: Option<&CommitObj>,
        keys: &[ContentKey],
    ) -> IndexResult<BTreeMap<ContentKey, CommitOp>> {
        let mut found = BTreeMap::new();
        let Some(commit) = commit else {
            return Ok(found);
        };
        let mut pending = Vec::new();
        for key in keys {
            match search(&commit.incremental_index, key) {
                Some(element) if element.op.is_add() => {
                    found.insert(key.clone(), element.op.clone());
                }
                Some(_) => {}
                None => pending.push(key),
            }
        }
        let Some(root) = commit.reference_index.filter(|_| !pending.is_empty()) else {
            return Ok(found);
        };
        match self.persist.fetch_segment(&root)?.body {
            SegmentBody::Leaf(elements) => {
                for key in pending {
                    if let Some(op) = live(search(&elements, key)) {
                        found.insert(key.clone(), op);
                    }
                }
            }
            SegmentBody::Stripes(stripes) => {
                let mut by_stripe: BTreeMap<ObjId, Vec<&ContentKey>> = BTreeMap::new();
                for key in pending {
                    if let Some(stripe) = find_stripe(&stripes, key) {
                        by_stripe.entry(stripe.segment).or_default().push(key);
                    }
                }
                let ids: Vec<ObjId> = by_stripe.keys().copied().collect();
                for (id, elements) in ids.iter().zip(self.fetch_leaves(&ids)?) {
                    for key in &by_stripe[id] {
                        if let Some(op) = live(search(&elements, key)) {
                            found.insert((*key).clone(), op);
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    /// Lazy, sorted iterator over all live keys at `commit`.
    pub fn keys(&self, commit: Option<&CommitObj>) -> IndexResult<KeyIter<'a>> {
        self.keys_from(commit, None)
    }

    /// Lazy, sorted iterator over the live keys at `commit` that are equal
    /// to or below `prefix`.
    pub fn keys_with_prefix(
        &self,
        commit: Option<&CommitObj>,
        prefix: ContentKey,
    ) -> IndexResult<impl Iterator<Item = IndexResult<(ContentKey, CommitOp)>> + 'a> {
        let iter = self.keys_from(commit, Some(prefix.clone()))?;
        Ok(iter.take_while(move |item| match item {
            Ok((key, _)) => key.starts_with(&prefix),
            Err(_) => true,
        }))
    }

    fn keys_from(
        &self,
        commit: Option<&CommitObj>,
        start: Option<ContentKey>,
    ) -> IndexResult<KeyIter<'a>> {
        let Some(commit) = commit else {
            return Ok(KeyIter::new(self.persist, &[], None, start));
        };
        let root = match commit.reference_index {
            Some(id) => Some(self.persist.fetch_segment(&id)?),
            None => None,
        };
        Ok(KeyIter::new(
            self.persist,
            &commit.incremental_index,
            root,
            start,
        ))
    }

    /// All live keys at `commit`, materialized in memory.
    pub fn complete_index(&self, commit: Option<&CommitObj>) -> IndexResult<StoreIndex> {
        self.keys(commit)?.collect()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Compute the index of a new child of `parent` that applies
    /// `mutations` (live entries put, tombstones delete).
    ///
    /// The incremental index carries over from the parent. When it exceeds
    /// the configured distance or size, a new complete index is materialized
    /// and only this commit's own mutations stay incremental.
    pub fn build_commit_index(
        &self,
        parent: Option<&CommitObj>,
        mutations: &StoreIndex,
    ) -> IndexResult<CommitIndex> {
        let config = self.persist.config();
        let mut incremental = match parent {
            Some(p) => StoreIndex::from_elements(&p.incremental_index),
            None => StoreIndex::new(),
        };
        for (key, op) in mutations.iter() {
            incremental.put(key.clone(), op.clone());
        }
        let elements: Vec<IndexElement> = incremental
            .iter()
            .map(|(key, op)| {
                IndexElement::new(key.clone(), op.clone(), mutations.get(key).is_some())
            })
            .collect();
        let size = bincode::serialized_size(&elements)? as usize;
        let parent_reference = parent.and_then(|p| p.reference_index);

        if elements.len() <= config.incremental_index_distance
            && size <= config.max_incremental_index_bytes
        {
            return Ok(CommitIndex {
                incremental_index: elements,
                reference_index: parent_reference,
                segments: Vec::new(),
            });
        }

        let mut complete = self.load_reference(parent_reference)?;
        complete.apply(&incremental);
        let (reference_index, segments) = self.build_segments(&complete)?;
        debug!(
            keys = complete.len(),
            segments = segments.len(),
            incremental = elements.len(),
            bytes = size,
            "materialized key index"
        );
        Ok(CommitIndex {
            incremental_index: mutations.to_elements(true),
            reference_index,
            segments,
        })
    }

    /// Split a complete index into segments no larger than the configured
    /// segment size, plus a stripe table when more than one is needed.
    pub fn build_segments(&self, complete: &StoreIndex) -> IndexResult<(Option<ObjId>, Vec<Obj>)> {
        if complete.is_empty() {
            return Ok((None, Vec::new()));
        }
        let max = self.persist.config().max_segment_bytes;
        let elements = complete.to_elements(false);
        if bincode::serialized_size(&elements)? as usize <= max {
            let leaf = IndexSegmentObj::leaf(elements)?;
            return Ok((Some(leaf.id), vec![leaf.into()]));
        }

        let mut chunks: Vec<Vec<IndexElement>> = Vec::new();
        let mut chunk = Vec::new();
        let mut chunk_size = 0usize;
        for element in elements {
            let element_size = bincode::serialized_size(&element)? as usize;
            if !chunk.is_empty() && chunk_size + element_size > max {
                chunks.push(std::mem::take(&mut chunk));
                chunk_size = 0;
            }
            chunk_size += element_size;
            chunk.push(element);
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        let mut segments = Vec::with_capacity(chunks.len() + 1);
        let mut stripes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
                continue;
            };
            let stripe_keys = (first.key.clone(), last.key.clone());
            let leaf = IndexSegmentObj::leaf(chunk)?;
            stripes.push(IndexStripe {
                first_key: stripe_keys.0,
                last_key: stripe_keys.1,
                segment: leaf.id,
            });
            segments.push(leaf.into());
        }
        let table = IndexSegmentObj::stripes(stripes)?;
        let root = table.id;
        segments.push(table.into());
        Ok((Some(root), segments))
    }

    /// Read a complete index into memory.
    pub fn load_reference(&self, root: Option<ObjId>) -> IndexResult<StoreIndex> {
        let Some(root) = root else {
            return Ok(StoreIndex::new());
        };
        match self.persist.fetch_segment(&root)?.body {
            SegmentBody::Leaf(elements) => Ok(StoreIndex::from_elements(&elements)),
            SegmentBody::Stripes(stripes) => {
                let ids: Vec<ObjId> = stripes.iter().map(|s| s.segment).collect();
                let mut index = StoreIndex::new();
                for elements in self.fetch_leaves(&ids)? {
                    for element in elements {
                        index.put(element.key, element.op);
                    }
                }
                Ok(index)
            }
        }
    }

    fn fetch_leaf(&self, id: &ObjId) -> IndexResult<Vec<IndexElement>> {
        match self.persist.fetch_segment(id)?.body {
            SegmentBody::Leaf(elements) => Ok(elements),
            SegmentBody::Stripes(_) => Err(IndexError::NestedStripes(*id)),
        }
    }

    fn fetch_leaves(&self, ids: &[ObjId]) -> IndexResult<Vec<Vec<IndexElement>>> {
        let fetched = self.persist.fetch_many(ids)?;
        ids.iter()
            .zip(fetched)
            .map(|(id, obj)| match obj {
                Some(Obj::IndexSegment(IndexSegmentObj {
                    body: SegmentBody::Leaf(elements),
                    ..
                })) => Ok(elements),
                Some(_) => Err(IndexError::NestedStripes(*id)),
                None => Err(StoreError::NotFound(*id).into()),
            })
            .collect()
    }
}

fn search<'e>(elements: &'e [IndexElement], key: &ContentKey) -> Option<&'e IndexElement> {
    elements
        .binary_search_by(|e| e.key.cmp(key))
        .ok()
        .map(|i| &elements[i])
}

fn live(element: Option<&IndexElement>) -> Option<CommitOp> {
    element.filter(|e| e.op.is_add()).map(|e| e.op.clone())
}

fn find_stripe<'s>(stripes: &'s [IndexStripe], key: &ContentKey) -> Option<&'s IndexStripe> {
    let i = stripes.partition_point(|s| s.last_key < *key);
    stripes.get(i).filter(|s| s.first_key <= *key)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use verso_store::{CommitMeta, InMemoryPersist, StoreConfig};

    use super::*;

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn val(s: &str) -> ObjId {
        ObjId::from_bytes(s.as_bytes())
    }

    /// Build, store and return a child of `parent` applying `ops`
    /// (`Some(value)` puts, `None` deletes).
    fn commit(
        persist: &InMemoryPersist,
        parent: Option<&CommitObj>,
        ops: &[(ContentKey, Option<ObjId>)],
    ) -> CommitObj {
        let mutations: StoreIndex = ops
            .iter()
            .map(|(k, v)| {
                let op = match v {
                    Some(v) => CommitOp::add(1, *v),
                    None => CommitOp::remove(1),
                };
                (k.clone(), op)
            })
            .collect();
        let logic = IndexesLogic::new(persist);
        let index = logic.build_commit_index(parent, &mutations).unwrap();
        persist.store_many(&index.segments).unwrap();
        let c = CommitObj::new(
            parent.map_or(1, |p| p.seq + 1),
            parent.map(|p| vec![p.id]).unwrap_or_default(),
            vec![],
            CommitMeta::new("test", "test"),
            index.incremental_index,
            index.reference_index,
        )
        .unwrap();
        persist.store(&Obj::from(c.clone())).unwrap();
        c
    }

    fn small_config() -> StoreConfig {
        StoreConfig::default()
            .with_incremental_index_distance(3)
            .with_max_segment_bytes(160)
    }

    fn all_keys(persist: &InMemoryPersist, c: &CommitObj) -> Vec<(String, ObjId)> {
        IndexesLogic::new(persist)
            .keys(Some(c))
            .unwrap()
            .map(|r| {
                let (k, op) = r.unwrap();
                (k.to_string(), op.value.unwrap())
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[test]
    fn empty_state_has_no_keys() {
        let persist = InMemoryPersist::default();
        let logic = IndexesLogic::new(&persist);
        assert!(logic.lookup(None, &key("a")).unwrap().is_none());
        assert_eq!(logic.keys(None).unwrap().count(), 0);
        assert!(logic.lookup_many(None, &[key("a")]).unwrap().is_empty());
    }

    #[test]
    fn lookup_in_incremental_index() {
        let persist = InMemoryPersist::default();
        let c1 = commit(&persist, None, &[(key("a"), Some(val("1")))]);
        let c2 = commit(&persist, Some(&c1), &[(key("b"), Some(val("2")))]);
        let logic = IndexesLogic::new(&persist);
        let a = logic.lookup(Some(&c2), &key("a")).unwrap().unwrap();
        let b = logic.lookup(Some(&c2), &key("b")).unwrap().unwrap();
        assert_eq!(a.value, Some(val("1")));
        assert_eq!(b.value, Some(val("2")));
        assert!(logic.lookup(Some(&c1), &key("b")).unwrap().is_none());
        assert!(c2.reference_index.is_none());
        assert_eq!(c2.mutations().count(), 1);
    }

    #[test]
    fn delete_then_readd_resolves_latest() {
        let persist = InMemoryPersist::default();
        let c1 = commit(&persist, None, &[(key("a"), Some(val("1")))]);
        let c2 = commit(&persist, Some(&c1), &[(key("a"), None)]);
        let c3 = commit(&persist, Some(&c2), &[(key("a"), Some(val("3")))]);
        let logic = IndexesLogic::new(&persist);
        assert!(logic.lookup(Some(&c2), &key("a")).unwrap().is_none());
        assert_eq!(logic.lookup(Some(&c3), &key("a")).unwrap().unwrap().value, Some(val("3")));
    }

    #[test]
    fn materializes_when_distance_exceeded() {
        let persist = InMemoryPersist::new(small_config());
        let mut head = commit(&persist, None, &[(key("k0"), Some(val("0")))]);
        for i in 1..4 {
            let k = key(&format!("k{i}"));
            head = commit(&persist, Some(&head), &[(k, Some(val(&i.to_string())))]);
        }
        // Four keys exceed a distance of three.
        assert!(head.reference_index.is_some());
        assert_eq!(head.incremental_index.len(), 1);
        assert!(head.incremental_index[0].current);
        assert_eq!(all_keys(&persist, &head).len(), 4);
        let logic = IndexesLogic::new(&persist);
        assert_eq!(logic.lookup(Some(&head), &key("k0")).unwrap().unwrap().value, Some(val("0")));
    }

    #[test]
    fn materialization_drops_tombstones() {
        let persist = InMemoryPersist::new(StoreConfig::default().with_incremental_index_distance(2));
        let c1 = commit(&persist, None, &[(key("a"), Some(val("a"))), (key("b"), Some(val("b")))]);
        let c2 = commit(&persist, Some(&c1), &[(key("a"), None)]);
        assert!(c2.reference_index.is_none());
        let c3 = commit(&persist, Some(&c2), &[(key("c"), Some(val("c")))]);
        assert!(c3.reference_index.is_some());
        let reference = IndexesLogic::new(&persist)
            .load_reference(c3.reference_index)
            .unwrap();
        assert!(reference.get(&key("a")).is_none());
        assert_eq!(all_keys(&persist, &c3), vec![("b".into(), val("b")), ("c".into(), val("c"))]);
    }

    #[test]
    fn large_indexes_are_striped() {
        let persist = InMemoryPersist::new(small_config());
        let ops: Vec<(ContentKey, Option<ObjId>)> = (0..30)
            .map(|i| (key(&format!("ns.table{i:02}")), Some(val(&i.to_string()))))
            .collect();
        let c1 = commit(&persist, None, &ops);
        let root = persist.fetch_segment(&c1.reference_index.unwrap()).unwrap();
        let SegmentBody::Stripes(stripes) = root.body else {
            panic!("expected a stripe table");
        };
        assert!(stripes.len() > 1);
        for pair in stripes.windows(2) {
            assert!(pair[0].last_key < pair[1].first_key);
        }

        let logic = IndexesLogic::new(&persist);
        let keys: Vec<ContentKey> = ops.iter().map(|(k, _)| k.clone()).collect();
        let found = logic.lookup_many(Some(&c1), &keys).unwrap();
        assert_eq!(found.len(), 30);
        assert_eq!(
            logic.lookup(Some(&c1), &key("ns.table17")).unwrap().unwrap().value,
            Some(val("17"))
        );
        assert!(logic.lookup(Some(&c1), &key("ns.zzz")).unwrap().is_none());
        assert_eq!(all_keys(&persist, &c1).len(), 30);
    }

    #[test]
    fn keys_with_prefix_stops_at_namespace_end() {
        let persist = InMemoryPersist::new(small_config());
        let ops: Vec<(ContentKey, Option<ObjId>)> = ["a.x", "b", "b.one", "b.two", "b0", "c"]
            .iter()
            .map(|k| (key(k), Some(val(k))))
            .collect();
        let c1 = commit(&persist, None, &ops);
        let logic = IndexesLogic::new(&persist);
        let keys: Vec<String> = logic
            .keys_with_prefix(Some(&c1), key("b"))
            .unwrap()
            .map(|r| r.unwrap().0.to_string())
            .collect();
        assert_eq!(keys, vec!["b", "b.one", "b.two"]);
    }

    #[test]
    fn missing_stripe_surfaces_error() {
        let persist = InMemoryPersist::new(small_config());
        let ops: Vec<(ContentKey, Option<ObjId>)> = (0..30)
            .map(|i| (key(&format!("t{i:02}")), Some(val(&i.to_string()))))
            .collect();
        let c1 = commit(&persist, None, &ops);

        // A backend that lost its leaves cannot serve the keys.
        let other = InMemoryPersist::new(small_config());
        let root = persist.fetch_segment(&c1.reference_index.unwrap()).unwrap();
        other.store(&Obj::from(root)).unwrap();
        let results: Vec<_> = IndexesLogic::new(&other).keys(Some(&c1)).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    // -----------------------------------------------------------------------
    // Oracle
    // -----------------------------------------------------------------------

    fn op_strategy() -> impl Strategy<Value = Vec<Vec<(u8, Option<u8>)>>> {
        prop::collection::vec(
            prop::collection::btree_map(0u8..12, prop::option::weighted(0.7, 0u8..50), 1..5)
                .prop_map(|m| m.into_iter().collect()),
            1..25,
        )
    }

    proptest! {
        #[test]
        fn index_matches_full_history_replay(history in op_strategy()) {
            let persist = InMemoryPersist::new(small_config());
            let mut oracle: BTreeMap<ContentKey, ObjId> = BTreeMap::new();
            let mut head: Option<CommitObj> = None;
            for step in history {
                let ops: Vec<(ContentKey, Option<ObjId>)> = step
                    .iter()
                    .map(|(k, v)| (key(&format!("k{k}")), v.map(|v| val(&v.to_string()))))
                    .collect();
                for (k, v) in &ops {
                    match v {
                        Some(v) => { oracle.insert(k.clone(), *v); }
                        None => { oracle.remove(k); }
                    }
                }
                let c = commit(&persist, head.as_ref(), &ops);
                let logic = IndexesLogic::new(&persist);
                for k in 0u8..12 {
                    let k = key(&format!("k{k}"));
                    let got = logic.lookup(Some(&c), &k).unwrap().and_then(|op| op.value);
                    prop_assert_eq!(got, oracle.get(&k).copied());
                }
                let listed: Vec<(ContentKey, ObjId)> = logic
                    .keys(Some(&c))
                    .unwrap()
                    .map(|r| r.map(|(k, op)| (k, op.value.unwrap())).unwrap())
                    .collect();
                let expected: Vec<(ContentKey, ObjId)> =
                    oracle.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(listed, expected);
                head = Some(c);
            }
        }
    }
}
