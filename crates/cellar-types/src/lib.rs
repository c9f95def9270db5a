//! Foundation types for Cellar.
//!
//! This crate provides the identity and lifecycle types shared by the store
//! and the cell data model. Every other Cellar crate depends on
//! `cellar-types`.
//!
//! # Key Types
//!
//! - [`Hash`] -- BLAKE3 digest of a canonical cell encoding
//! - [`RefStatus`] -- monotonic persistence lifecycle of a ref

pub mod error;
pub mod hash;
pub mod status;

pub use error::TypeError;
pub use hash::{Hash, HASH_LENGTH};
pub use status::RefStatus;
