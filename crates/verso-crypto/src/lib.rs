//! Content hashing for verso.
//!
//! Object ids are domain-separated BLAKE3 hashes over the canonical bincode
//! encoding of an object body. Each object kind has its own domain, so a
//! commit and a value with identical bytes never share an id.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
