//! Weak interning of symbols and keywords.
//!
//! Building the same symbol twice while the first is still alive returns the
//! first cell, so its encoding and hash are computed once. The cache holds no
//! strong references: a name disappears from it once every cell using it is
//! dropped. When the table reaches its capacity, dead entries are purged and,
//! if that frees nothing, the table is cleared. Clearing never affects
//! correctness, only sharing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{LazyLock, RwLock};

use tracing::debug;

use crate::cell::{Cell, WeakCell};
use crate::tag::Tag;

/// Default maximum number of names held per table.
pub const DEFAULT_INTERN_CAPACITY: usize = 10_000;

type Table = RwLock<HashMap<Box<str>, WeakCell>>;

struct Interner {
    symbols: Table,
    keywords: Table,
    enabled: AtomicBool,
    capacity: AtomicUsize,
}

static INTERNER: LazyLock<Interner> = LazyLock::new(|| Interner {
    symbols: RwLock::new(HashMap::new()),
    keywords: RwLock::new(HashMap::new()),
    enabled: AtomicBool::new(true),
    capacity: AtomicUsize::new(DEFAULT_INTERN_CAPACITY),
});

impl Interner {
    fn table(&self, tag: Tag) -> &Table {
        if tag == Tag::Keyword {
            &self.keywords
        } else {
            &self.symbols
        }
    }
}

/// Return the live cell for `name`, or build one with `make` and remember it.
pub(crate) fn intern(tag: Tag, name: &str, make: impl FnOnce() -> Cell) -> Cell {
    let interner = &*INTERNER;
    if !interner.enabled.load(Ordering::Relaxed) {
        return make();
    }
    let table = interner.table(tag);
    if let Some(cell) = table
        .read()
        .expect("lock poisoned")
        .get(name)
        .and_then(WeakCell::upgrade)
    {
        return cell;
    }
    let mut map = table.write().expect("lock poisoned");
    if let Some(cell) = map.get(name).and_then(WeakCell::upgrade) {
        return cell;
    }
    let capacity = interner.capacity.load(Ordering::Relaxed);
    if map.len() >= capacity {
        map.retain(|_, weak| !weak.is_dead());
        if map.len() >= capacity {
            debug!(tag = tag.name(), entries = map.len(), "intern table full, clearing");
            map.clear();
        }
    }
    let cell = make();
    map.insert(name.into(), cell.downgrade());
    cell
}

/// Turn interning on or off and set the per-table capacity.
pub fn configure(enabled: bool, capacity: usize) {
    INTERNER.enabled.store(enabled, Ordering::Relaxed);
    INTERNER.capacity.store(capacity.max(1), Ordering::Relaxed);
}

/// Drop every cached entry.
pub fn clear() {
    INTERNER.symbols.write().expect("lock poisoned").clear();
    INTERNER.keywords.write().expect("lock poisoned").clear();
}

/// Number of table entries, live or dead.
pub fn len() -> usize {
    INTERNER.symbols.read().expect("lock poisoned").len()
        + INTERNER.keywords.read().expect("lock poisoned").len()
}
