//! Merge and transplant for verso.
//!
//! Both operations replay changes from elsewhere in the commit graph onto a
//! target branch, deciding key by key:
//!
//! - a key changed only by the source takes the source's state;
//! - a key changed identically on both sides needs nothing;
//! - a key changed differently on both sides follows its
//!   [`MergeBehavior`]: `Normal` reports a conflict, `Force` takes the
//!   source, `Drop` keeps the target.
//!
//! A caller may also pre-resolve a key, stating what it expects on the
//! target; a wrong expectation is itself a conflict.
//!
//! All decisions are made before anything is written. A dry run stops
//! there and reports them. Otherwise, with no conflicts, each produced
//! commit is stored and published with its own compare-and-swap on the
//! target branch.
//!
//! # Modules
//!
//! - [`error`]: Error types
//! - [`types`]: Options, behaviors and the [`MergeResult`] report
//! - [`merge`]: Merge a source commit's history into a branch
//! - [`transplant`]: Replay an explicit list of commits onto a branch

pub mod error;
#[cfg(test)]
mod fixture;
pub mod merge;
mod plan;
pub mod transplant;
pub mod types;

pub use error::{MergeError, MergeOpResult};
pub use merge::MergeLogic;
pub use types::{
    KeyConflict, KeyDetails, MergeBehavior, MergeMode, MergeOptions, MergeResult, Resolution,
    Resolved,
};
