use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use verso_crypto::ContentHasher;
use verso_types::{ContentKey, ObjId};

use crate::error::{StoreError, StoreResult};

/// The kind of a stored object. Its byte value prefixes the wire form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjType {
    /// A node of the commit graph.
    Commit,
    /// A versioned content value.
    Value,
    /// A piece of a complete key index.
    IndexSegment,
}

impl ObjType {
    /// Wire discriminator byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Value => 2,
            Self::IndexSegment => 3,
        }
    }

    /// Parse a wire discriminator byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::Value),
            3 => Some(Self::IndexSegment),
            _ => None,
        }
    }

    fn hasher(self) -> &'static ContentHasher {
        match self {
            Self::Commit => &ContentHasher::COMMIT,
            Self::Value => &ContentHasher::VALUE,
            Self::IndexSegment => &ContentHasher::SEGMENT,
        }
    }
}

impl std::fmt::Display for ObjType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Value => write!(f, "value"),
            Self::IndexSegment => write!(f, "index segment"),
        }
    }
}

// ---------------------------------------------------------------------------
// Obj
// ---------------------------------------------------------------------------

/// An immutable, content-addressed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Obj {
    Commit(CommitObj),
    Value(ContentValueObj),
    IndexSegment(IndexSegmentObj),
}

impl Obj {
    /// The object's content-addressed id.
    pub fn id(&self) -> ObjId {
        match self {
            Self::Commit(c) => c.id,
            Self::Value(v) => v.id,
            Self::IndexSegment(s) => s.id,
        }
    }

    pub fn obj_type(&self) -> ObjType {
        match self {
            Self::Commit(_) => ObjType::Commit,
            Self::Value(_) => ObjType::Value,
            Self::IndexSegment(_) => ObjType::IndexSegment,
        }
    }

    /// Encode to the wire form: one type byte followed by the canonical bytes.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let body = match self {
            Self::Commit(c) => bincode::serialize(c)?,
            Self::Value(v) => bincode::serialize(v)?,
            Self::IndexSegment(s) => bincode::serialize(s)?,
        };
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(self.obj_type().as_byte());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode the wire form of the object stored under `id`.
    ///
    /// The canonical bytes are re-hashed; a mismatch with `id` is reported
    /// as [`StoreError::CorruptObject`].
    pub fn decode(id: ObjId, data: &[u8]) -> StoreResult<Self> {
        let (&type_byte, body) = data.split_first().ok_or_else(|| StoreError::CorruptObject {
            id,
            reason: "empty object data".into(),
        })?;
        let obj_type = ObjType::from_byte(type_byte).ok_or_else(|| StoreError::CorruptObject {
            id,
            reason: format!("unknown object type byte {type_byte}"),
        })?;
        if !obj_type.hasher().verify(body, &id) {
            return Err(StoreError::CorruptObject {
                id,
                reason: "content does not match id".into(),
            });
        }
        let corrupt = |e: bincode::Error| StoreError::CorruptObject {
            id,
            reason: e.to_string(),
        };
        Ok(match obj_type {
            ObjType::Commit => {
                let mut c: CommitObj = bincode::deserialize(body).map_err(corrupt)?;
                c.id = id;
                Self::Commit(c)
            }
            ObjType::Value => {
                let mut v: ContentValueObj = bincode::deserialize(body).map_err(corrupt)?;
                v.id = id;
                Self::Value(v)
            }
            ObjType::IndexSegment => {
                let mut s: IndexSegmentObj = bincode::deserialize(body).map_err(corrupt)?;
                s.id = id;
                Self::IndexSegment(s)
            }
        })
    }
}

impl From<CommitObj> for Obj {
    fn from(c: CommitObj) -> Self {
        Self::Commit(c)
    }
}

impl From<ContentValueObj> for Obj {
    fn from(v: ContentValueObj) -> Self {
        Self::Value(v)
    }
}

impl From<IndexSegmentObj> for Obj {
    fn from(s: IndexSegmentObj) -> Self {
        Self::IndexSegment(s)
    }
}

// ---------------------------------------------------------------------------
// Index elements
// ---------------------------------------------------------------------------

/// Whether a key mutation puts or deletes a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpAction {
    Add,
    Remove,
}

/// The state of one key in a key index.
///
/// For `Add`, `value` points at the [`ContentValueObj`] and `payload` is its
/// content type. A `Remove` is a tombstone that hides any older entry for
/// the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitOp {
    pub action: OpAction,
    pub payload: u8,
    pub value: Option<ObjId>,
}

impl CommitOp {
    pub fn add(payload: u8, value: ObjId) -> Self {
        Self {
            action: OpAction::Add,
            payload,
            value: Some(value),
        }
    }

    pub fn remove(payload: u8) -> Self {
        Self {
            action: OpAction::Remove,
            payload,
            value: None,
        }
    }

    pub fn is_add(&self) -> bool {
        self.action == OpAction::Add
    }

    /// The value id, only for live (`Add`) entries.
    pub fn live_value(&self) -> Option<ObjId> {
        if self.is_add() {
            self.value
        } else {
            None
        }
    }
}

/// A key and its state, as held in incremental indexes and segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexElement {
    pub key: ContentKey,
    pub op: CommitOp,
    /// `true` if the mutation was introduced by the commit holding it.
    pub current: bool,
}

impl IndexElement {
    pub fn new(key: ContentKey, op: CommitOp, current: bool) -> Self {
        Self { key, op, current }
    }
}

// ---------------------------------------------------------------------------
// CommitObj
// ---------------------------------------------------------------------------

/// Commit metadata. Opaque to the engine apart from ordering in logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub properties: BTreeMap<String, String>,
}

impl CommitMeta {
    /// Metadata stamped with the current time.
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            timestamp: Utc::now(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A node of the commit graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObj {
    #[serde(skip)]
    pub id: ObjId,
    /// Distance from the root; the first commit on an empty branch has 1.
    pub seq: u64,
    /// Ancestors, direct parent first. Bounded in length.
    pub tail: Vec<ObjId>,
    /// Merge parents.
    pub secondary_parents: Vec<ObjId>,
    pub meta: CommitMeta,
    /// Sorted key states accumulated since the last materialized segment.
    pub incremental_index: Vec<IndexElement>,
    /// Complete index segment, if one has been materialized.
    pub reference_index: Option<ObjId>,
}

impl CommitObj {
    /// Build a commit and compute its id.
    pub fn new(
        seq: u64,
        tail: Vec<ObjId>,
        secondary_parents: Vec<ObjId>,
        meta: CommitMeta,
        incremental_index: Vec<IndexElement>,
        reference_index: Option<ObjId>,
    ) -> StoreResult<Self> {
        let mut commit = Self {
            id: ObjId::EMPTY,
            seq,
            tail,
            secondary_parents,
            meta,
            incremental_index,
            reference_index,
        };
        commit.id = ContentHasher::COMMIT.hash_canonical(&commit)?;
        Ok(commit)
    }

    /// The direct parent, or [`ObjId::EMPTY`] for a root commit.
    pub fn parent(&self) -> ObjId {
        self.tail.first().copied().unwrap_or(ObjId::EMPTY)
    }

    /// The key mutations this commit introduced relative to its parent.
    pub fn mutations(&self) -> impl Iterator<Item = &IndexElement> {
        self.incremental_index.iter().filter(|e| e.current)
    }

    pub fn is_empty_commit(&self) -> bool {
        self.mutations().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// ContentValueObj
// ---------------------------------------------------------------------------

/// A stored content value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentValueObj {
    #[serde(skip)]
    pub id: ObjId,
    /// Logical id, stable across updates of the same content.
    pub content_id: String,
    /// Content-type discriminator.
    pub payload: u8,
    pub data: Vec<u8>,
}

impl ContentValueObj {
    pub fn new(content_id: impl Into<String>, payload: u8, data: Vec<u8>) -> StoreResult<Self> {
        let mut value = Self {
            id: ObjId::EMPTY,
            content_id: content_id.into(),
            payload,
            data,
        };
        value.id = ContentHasher::VALUE.hash_canonical(&value)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// IndexSegmentObj
// ---------------------------------------------------------------------------

/// One stripe of a striped complete index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStripe {
    pub first_key: ContentKey,
    pub last_key: ContentKey,
    pub segment: ObjId,
}

/// Body of an index segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentBody {
    /// Sorted, live index elements.
    Leaf(Vec<IndexElement>),
    /// Sorted, non-overlapping references to leaf segments.
    Stripes(Vec<IndexStripe>),
}

/// A serialized, sorted key map or a table of its stripes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSegmentObj {
    #[serde(skip)]
    pub id: ObjId,
    pub body: SegmentBody,
}

impl IndexSegmentObj {
    pub fn leaf(elements: Vec<IndexElement>) -> StoreResult<Self> {
        Self::new(SegmentBody::Leaf(elements))
    }

    pub fn stripes(stripes: Vec<IndexStripe>) -> StoreResult<Self> {
        Self::new(SegmentBody::Stripes(stripes))
    }

    fn new(body: SegmentBody) -> StoreResult<Self> {
        let mut segment = Self {
            id: ObjId::EMPTY,
            body,
        };
        segment.id = ContentHasher::SEGMENT.hash_canonical(&segment)?;
        Ok(segment)
    }
}

// ---------------------------------------------------------------------------
// RefObj
// ---------------------------------------------------------------------------

/// Optimistic-concurrency token of a reference. Changes on every mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub u64);

impl VersionToken {
    /// A fresh random token.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A named, mutable pointer to a commit. Mutated only via compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefObj {
    pub name: String,
    pub pointer: ObjId,
    pub token: VersionToken,
    pub created_at: DateTime<Utc>,
}

impl RefObj {
    /// A new reference record with a fresh token.
    pub fn new(name: impl Into<String>, pointer: ObjId) -> Self {
        Self {
            name: name.into(),
            pointer,
            token: VersionToken::random(),
            created_at: Utc::now(),
        }
    }
}
