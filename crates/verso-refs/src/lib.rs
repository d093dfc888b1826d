//! Reference management for verso.
//!
//! References are the named, mutable entry points into the commit graph.
//! They are never locked: every change is a compare-and-swap on the
//! reference's version token, and a writer that loses the race gets a
//! conflict carrying the pointer that won.
//!
//! # Architecture
//!
//! - **Branches** (`refs/heads/...`) advance as commits are published.
//! - **Tags** (`refs/tags/...`) mark a commit. They can be reassigned with
//!   the same compare-and-swap discipline as branches.
//! - A fresh reference may point at [`ObjId::EMPTY`](verso_types::ObjId::EMPTY),
//!   the empty state. Any other pointer must name a stored commit.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`types`]: [`NamedRef`] and the resolved [`Reference`]
//! - [`names`]: Reference name validation
//! - [`logic`]: [`ReferenceLogic`] to create, resolve, assign, delete, list
//! - [`retry`]: Bounded, randomized retry for operations that lose a race

pub mod error;
pub mod logic;
pub mod names;
pub mod retry;
pub mod types;

pub use error::{RefError, RefResult};
pub use logic::ReferenceLogic;
pub use names::validate_ref_name;
pub use retry::{retry, Backoff, RetryExhausted};
pub use types::{NamedRef, Reference};
pub use verso_store::RetryPolicy;
