//! High-level API for verso.
//!
//! [`VersionStore`] puts references, commits, reads, merge and transplant
//! behind one handle that speaks caller-facing [`Content`]. It is the main
//! entry point for applications embedding verso. [`AsyncVersionStore`]
//! offers the same calls as futures.

pub mod async_store;
pub mod commit;
pub mod error;
pub mod logging;
pub mod repository;
pub mod types;

pub use async_store::AsyncVersionStore;
pub use commit::ContentOperation;
pub use error::{VersionStoreError, VersionStoreResult};
pub use logging::init_logging;
pub use repository::VersionStore;
pub use types::{KeyEntry, Ref};

// Re-export key types
pub use verso_dag::CommitLog;
pub use verso_diff::{KeyChange, KeyDiff};
pub use verso_merge::{
    KeyConflict, KeyDetails, MergeBehavior, MergeMode, MergeOptions, MergeResult, Resolved,
};
pub use verso_refs::{NamedRef, Reference};
pub use verso_store::{CommitMeta, CommitObj, Content, ContentTypeRegistry, StoreConfig};
pub use verso_types::{ContentKey, ObjId};
