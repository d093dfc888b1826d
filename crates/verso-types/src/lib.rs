//! Foundation types for verso, a content-addressed version store for
//! structured metadata.
//!
//! Every other verso crate depends on `verso-types`.
//!
//! # Key Types
//!
//! - [`ObjId`]: Content-addressed identifier (BLAKE3 hash) of an immutable object
//! - [`ContentKey`]: Hierarchical name of a versioned value (e.g. `db.schema.table`)

pub mod error;
pub mod key;
pub mod object;

pub use error::TypeError;
pub use key::ContentKey;
pub use object::ObjId;
