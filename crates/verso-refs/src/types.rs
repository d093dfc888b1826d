//! Core reference types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use verso_store::{RefObj, VersionToken};
use verso_types::ObjId;

const HEADS: &str = "refs/heads/";
const TAGS: &str = "refs/tags/";

/// The name of a branch or tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NamedRef {
    Branch(String),
    Tag(String),
}

impl NamedRef {
    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch(name.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self::Tag(name.into())
    }

    /// The name under which the backend stores this reference
    /// (e.g. "refs/heads/main").
    pub fn canonical_name(&self) -> String {
        match self {
            Self::Branch(name) => format!("{HEADS}{name}"),
            Self::Tag(name) => format!("{TAGS}{name}"),
        }
    }

    /// Parse a canonical name.
    pub fn from_canonical(name: &str) -> Option<Self> {
        if let Some(short) = name.strip_prefix(HEADS) {
            return Some(Self::Branch(short.to_string()));
        }
        name.strip_prefix(TAGS).map(|short| Self::Tag(short.to_string()))
    }

    /// The name without the `refs/...` prefix.
    pub fn short_name(&self) -> &str {
        match self {
            Self::Branch(name) | Self::Tag(name) => name,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Branch(_))
    }
}

impl fmt::Display for NamedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch(name) => write!(f, "branch {name}"),
            Self::Tag(name) => write!(f, "tag {name}"),
        }
    }
}

/// A resolved reference: where it points and the token a writer must
/// present to move it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub named: NamedRef,
    pub pointer: ObjId,
    pub token: VersionToken,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    /// Interpret a backend record. `None` for names outside `refs/heads`
    /// and `refs/tags`.
    pub fn from_obj(obj: RefObj) -> Option<Self> {
        let named = NamedRef::from_canonical(&obj.name)?;
        Some(Self {
            named,
            pointer: obj.pointer,
            token: obj.token,
            created_at: obj.created_at,
        })
    }

    /// `true` while the reference still points at the empty state.
    pub fn is_empty(&self) -> bool {
        self.pointer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        assert_eq!(NamedRef::branch("main").canonical_name(), "refs/heads/main");
        assert_eq!(NamedRef::tag("v1").canonical_name(), "refs/tags/v1");
        assert_eq!(
            NamedRef::from_canonical("refs/heads/feature/x"),
            Some(NamedRef::branch("feature/x"))
        );
        assert_eq!(NamedRef::from_canonical("refs/tags/v1"), Some(NamedRef::tag("v1")));
        assert_eq!(NamedRef::from_canonical("HEAD"), None);
    }

    #[test]
    fn branch_and_tag_with_same_name_differ() {
        let b = NamedRef::branch("x");
        let t = NamedRef::tag("x");
        assert_ne!(b.canonical_name(), t.canonical_name());
        assert_eq!(b.short_name(), t.short_name());
        assert!(b.is_branch());
        assert!(!t.is_branch());
    }

    #[test]
    fn reference_from_obj() {
        let obj = RefObj::new("refs/tags/v1", ObjId::from_bytes(b"c"));
        let reference = Reference::from_obj(obj.clone()).unwrap();
        assert_eq!(reference.named, NamedRef::tag("v1"));
        assert_eq!(reference.token, obj.token);
        assert!(!reference.is_empty());
        assert!(Reference::from_obj(RefObj::new("other", ObjId::EMPTY)).is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let named = NamedRef::branch("main");
        let json = serde_json::to_string(&named).unwrap();
        assert_eq!(serde_json::from_str::<NamedRef>(&json).unwrap(), named);
    }
}
