use std::fmt;

use serde::{Deserialize, Serialize};
use verso_refs::NamedRef;
use verso_types::{ContentKey, ObjId};

/// Where a read happens: the current head of a named reference, or a
/// specific commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ref {
    Named(NamedRef),
    Hash(ObjId),
}

impl From<NamedRef> for Ref {
    fn from(named: NamedRef) -> Self {
        Self::Named(named)
    }
}

impl From<&NamedRef> for Ref {
    fn from(named: &NamedRef) -> Self {
        Self::Named(named.clone())
    }
}

impl From<ObjId> for Ref {
    fn from(id: ObjId) -> Self {
        Self::Hash(id)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(named) => write!(f, "{named}"),
            Self::Hash(id) => write!(f, "commit {}", id.short_hex()),
        }
    }
}

/// A live key as listed by `get_keys`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key: ContentKey,
    pub content_type: String,
    /// Id of the stored content value.
    pub value: ObjId,
}
