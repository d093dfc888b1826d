//! Object model and persist backend contract for verso.
//!
//! Every piece of versioned state is an immutable object identified by the
//! BLAKE3 hash of its canonical encoding (domain-separated by object kind).
//! Named references are the only mutable state and change exclusively
//! through compare-and-swap on a version token.
//!
//! # Object Types
//!
//! - [`CommitObj`] -- a node of the commit graph with its key-index delta
//! - [`ContentValueObj`] -- a stored content value
//! - [`IndexSegmentObj`] -- a complete key index, or a table of its stripes
//! - [`RefObj`] -- a named pointer to a commit (not content-addressed)
//!
//! # Backends
//!
//! All backends implement the [`Persist`] trait:
//!
//! - [`InMemoryPersist`] -- map-based backend for tests and embedding
//! - [`CachingPersist`] -- decorator caching immutable objects
//!
//! # Design Rules
//!
//! 1. Objects are immutable once stored; storing an existing id is a no-op.
//! 2. Store objects first, then publish them by moving a reference.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. Reference writes either apply atomically or report a lost race.
//! 5. All backend errors are propagated, never silently ignored.

pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use cache::CachingPersist;
pub use config::{RetryPolicy, StoreConfig};
pub use content::{Content, ContentTypeRegistry};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryPersist;
pub use object::{
    CommitMeta, CommitObj, CommitOp, ContentValueObj, IndexElement, IndexSegmentObj,
    IndexStripe, Obj, ObjType, OpAction, RefObj, SegmentBody, VersionToken,
};
pub use traits::{Persist, RefIter};
