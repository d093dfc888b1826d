//! A small repository for merge and transplant tests.

use verso_commit::{CommitLogic, CommitOperation};
use verso_index::IndexesLogic;
use verso_refs::{NamedRef, ReferenceLogic};
use verso_store::{CommitMeta, InMemoryPersist};
use verso_types::{ContentKey, ObjId};

pub fn key(s: &str) -> ContentKey {
    ContentKey::parse(s).unwrap()
}

pub fn val(s: &str) -> ObjId {
    ObjId::from_bytes(s.as_bytes())
}

pub struct Repo {
    pub persist: InMemoryPersist,
}

impl Repo {
    /// A repository with an empty `main`.
    pub fn new() -> Self {
        let repo = Self {
            persist: InMemoryPersist::default(),
        };
        repo.branch("main", ObjId::EMPTY);
        repo
    }

    pub fn main(&self) -> NamedRef {
        NamedRef::branch("main")
    }

    pub fn branch(&self, name: &str, at: ObjId) -> NamedRef {
        let named = NamedRef::branch(name);
        ReferenceLogic::new(&self.persist).create(&named, at).unwrap();
        named
    }

    pub fn head(&self, branch: &NamedRef) -> ObjId {
        ReferenceLogic::new(&self.persist).get(branch).unwrap().pointer
    }

    /// Commit puts (`Some`) and deletes (`None`).
    pub fn commit(&self, branch: &NamedRef, msg: &str, ops: &[(&str, Option<&str>)]) -> ObjId {
        let ops = ops
            .iter()
            .map(|(k, v)| match v {
                Some(v) => CommitOperation::put(key(k), 1, val(v)),
                None => CommitOperation::delete(key(k)),
            })
            .collect();
        CommitLogic::new(&self.persist)
            .commit(branch, None, CommitMeta::new("tester", msg), ops)
            .unwrap()
            .id
    }

    pub fn value(&self, commit: ObjId, k: &str) -> Option<ObjId> {
        let commit = CommitLogic::new(&self.persist).fetch_commit(commit).unwrap();
        IndexesLogic::new(&self.persist)
            .lookup(commit.as_ref(), &key(k))
            .unwrap()
            .and_then(|op| op.value)
    }
}
