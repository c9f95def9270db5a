//! Content-addressed cell storage for Cellar.
//!
//! This crate implements the store collaborator of the cell data model: a
//! hash-keyed map from [`Hash`](cellar_types::Hash) to canonical cell
//! encodings, each record carrying the highest
//! [`RefStatus`](cellar_types::RefStatus) written for it.
//!
//! # Storage Backends
//!
//! All backends implement the [`CellStore`] trait:
//!
//! - [`MemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`DirStore`] -- one file per record under a fan-out directory tree
//!
//! # Design Rules
//!
//! 1. Encodings are immutable once written (content-addressing guarantees this).
//! 2. Every write is verified against its hash before it lands.
//! 3. Statuses merge monotonically; a write never downgrades a record.
//! 4. The store never interprets encodings -- it is a pure key-value store.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod dir;
pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use config::StoreConfig;
pub use dir::DirStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use record::StoredCell;
pub use traits::CellStore;
