//! Commit graph traversal for verso.
//!
//! The commit graph is append-only and acyclic by construction: a commit id
//! is the hash of content that includes its parents' ids. Walks here are
//! explicit worklists over ids fetched from a [`Persist`](verso_store::Persist)
//! backend; no commit holds a live reference to another.
//!
//! # Modules
//!
//! - [`error`]: Error types for traversal
//! - [`log`]: [`CommitLog`], a lazy and restartable newest-first history
//! - [`ancestor`]: [`common_ancestor`] of two heads

pub mod ancestor;
pub mod error;
pub mod log;

pub use ancestor::common_ancestor;
pub use error::{DagError, DagResult};
pub use log::CommitLog;
