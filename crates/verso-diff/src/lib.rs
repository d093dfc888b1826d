//! Diff engine for verso.
//!
//! Compares the complete key sets of two commits and reports which keys
//! were added, removed or changed. Merge uses the same comparison against
//! the common ancestor to find the keys each side touched.
//!
//! # Key Types
//!
//! - [`KeyDiff`] / [`KeyChange`] -- Key-level changes between two indexes

pub mod error;
pub mod key_diff;

pub use error::{DiffError, DiffResult};
pub use key_diff::{diff_commits, diff_indexes, KeyChange, KeyDiff};
