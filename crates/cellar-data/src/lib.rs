//! Cells, refs and persistent collections for Cellar.
//!
//! A [`Cell`] is an immutable value with a canonical binary encoding. A
//! [`Ref`] points at a cell either directly or by the [`Hash`] of that
//! encoding, which lets a value graph be partly in memory and partly in a
//! [`CellStore`](cellar_store::CellStore). Small cells (at most
//! [`MAX_EMBEDDED_LENGTH`] encoded bytes) are inlined into their parent's
//! encoding; larger ones are written separately and referenced by hash.
//!
//! # Modules
//!
//! - [`codec`] -- canonical encoding and decoding
//! - [`reference`] -- refs, resolution and persistence
//! - [`graph`] -- ref-graph traversals and statistics
//! - [`vector`], [`set`], [`map`] -- persistent radix collections
//! - [`print`] -- bounded text rendering
//!
//! # Design Rules
//!
//! 1. Equal values have byte-identical encodings and therefore equal hashes.
//! 2. Decoding accepts only canonical encodings.
//! 3. Persistence status only moves forward.
//! 4. No operation recurses on graph depth; work lists live on the heap.
//! 5. Untrusted bytes produce errors, never panics.

pub mod cell;
pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod integer;
pub mod intern;
pub mod map;
pub mod print;
pub mod reference;
pub mod set;
pub mod strings;
pub mod tag;
pub mod trie;
mod validate;
pub mod vector;
pub mod vlc;

pub use cell::{Cell, Value};
pub use codec::{decode, encode, Decoder};
pub use config::DataConfig;
pub use error::{DataError, DataResult};
pub use graph::{
    accumulate_ref_set, find_missing, ref_tree_stats, total_ref_count, unique_ref_count,
    visit_all_refs, RefTreeStats,
};
pub use map::Map;
pub use print::{print, Printed};
pub use reference::Ref;
pub use set::Set;
pub use tag::{Tag, MAX_EMBEDDED_LENGTH};
pub use vector::Vector;

pub use cellar_types::{Hash, RefStatus};
