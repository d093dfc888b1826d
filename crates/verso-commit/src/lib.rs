//! Commit logic for verso.
//!
//! A commit turns an ordered list of key operations into a new, immutable
//! [`CommitObj`](verso_store::CommitObj) whose first parent is the current
//! branch head, then publishes it with a single compare-and-swap on the
//! branch reference. Readers see the commit entirely or not at all.
//!
//! Each operation may carry an expectation about the key's current state.
//! Violations surface as [`CommitConflict`]s; a [`ConflictHandler`] decides
//! whether a conflict aborts the commit, is ignored, or drops the key.
//! Merge and transplant reuse the same construction path with their own
//! handlers.
//!
//! Commit logic never retries. A lost race is reported as a reference
//! conflict and the caller decides what to do.

pub mod conflict;
pub mod error;
pub mod logic;
pub mod ops;

pub use conflict::{
    fail_on_conflict, CommitConflict, ConflictHandler, ConflictResolution, ConflictType,
};
pub use error::{CommitError, CommitResult};
pub use logic::{check_expected_hash, BuiltCommit, CommitLogic};
pub use ops::{CommitOperation, CreateCommit, Expected};
