//! Key index for verso.
//!
//! Resolves "value of key K at commit C" without replaying history. Each
//! commit carries an incremental index: the key states changed since the
//! last materialized complete index. Once the incremental index grows past
//! its configured distance or size, a complete sorted index is written as
//! one or more [`IndexSegmentObj`](verso_store::IndexSegmentObj)s and the
//! commit points at it.
//!
//! # Key Types
//!
//! - [`StoreIndex`] -- In-memory sorted key map used to build and compare indexes
//! - [`IndexesLogic`] -- Lookup, key iteration and index construction over a backend
//! - [`KeyIter`] -- Lazy, sorted iteration over the live keys of a commit
//! - [`CommitIndex`] -- The index parts of a commit about to be created

pub mod error;
pub mod iter;
pub mod logic;
pub mod store_index;

pub use error::{IndexError, IndexResult};
pub use iter::KeyIter;
pub use logic::{CommitIndex, IndexesLogic};
pub use store_index::StoreIndex;
