use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use cellar_store::{CellStore, StoreError};
use cellar_types::{Hash, RefStatus};
use tracing::{debug, trace};

use crate::cell::Cell;
use crate::codec::Decoder;
use crate::error::{DataError, DataResult};
use crate::graph::Resolver;

enum Slot {
    Direct(Cell),
    Indirect {
        hash: Hash,
        cell: OnceLock<Cell>,
        store: Option<Arc<dyn CellStore>>,
    },
}

/// A handle to a cell, either held in memory or known only by hash.
///
/// A direct ref owns its cell. An indirect ref carries the hash and, when
/// bound to a store, resolves the cell on first use and keeps it. Equality,
/// ordering and hashing use the cell hash only, so a direct and an indirect
/// ref to the same value are interchangeable.
#[derive(Clone)]
pub struct Ref {
    slot: Arc<Slot>,
}

impl Ref {
    pub fn direct(cell: Cell) -> Self {
        Self {
            slot: Arc::new(Slot::Direct(cell)),
        }
    }

    /// A ref that can never be resolved, useful for tests and placeholders.
    pub fn for_hash(hash: Hash) -> Self {
        Self::indirect(hash, None)
    }

    /// A ref that resolves lazily from `store`.
    pub fn for_hash_in(hash: Hash, store: Arc<dyn CellStore>) -> Self {
        Self::indirect(hash, Some(store))
    }

    pub(crate) fn indirect(hash: Hash, store: Option<Arc<dyn CellStore>>) -> Self {
        Self {
            slot: Arc::new(Slot::Indirect {
                hash,
                cell: OnceLock::new(),
                store,
            }),
        }
    }

    pub fn hash(&self) -> Hash {
        match &*self.slot {
            Slot::Direct(cell) => cell.hash(),
            Slot::Indirect { hash, .. } => *hash,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(&*self.slot, Slot::Direct(_))
    }

    /// The cell of a direct ref.
    pub fn direct_cell(&self) -> Option<&Cell> {
        match &*self.slot {
            Slot::Direct(cell) => Some(cell),
            Slot::Indirect { .. } => None,
        }
    }

    /// The cell if it is already in memory, without touching any store.
    pub fn cached(&self) -> Option<&Cell> {
        match &*self.slot {
            Slot::Direct(cell) => Some(cell),
            Slot::Indirect { cell, .. } => cell.get(),
        }
    }

    /// The store an indirect ref resolves from.
    pub fn store(&self) -> Option<&Arc<dyn CellStore>> {
        match &*self.slot {
            Slot::Direct(_) => None,
            Slot::Indirect { store, .. } => store.as_ref(),
        }
    }

    /// Whether the target is inlined in its parent's encoding.
    ///
    /// Indirect refs are never embedded.
    pub fn is_embedded(&self) -> bool {
        self.embedded_cell().is_some()
    }

    pub(crate) fn embedded_cell(&self) -> Option<&Cell> {
        self.direct_cell().filter(|cell| cell.is_embedded())
    }

    /// The referenced cell, fetching it from the bound store if needed.
    pub fn value(&self) -> DataResult<Cell> {
        let (hash, slot, store) = match &*self.slot {
            Slot::Direct(cell) => return Ok(cell.clone()),
            Slot::Indirect { hash, cell, store } => (*hash, cell, store),
        };
        if let Some(cell) = slot.get() {
            return Ok(cell.clone());
        }
        let store = store.as_ref().ok_or(DataError::MissingData(hash))?;
        let record = store.get(&hash)?.ok_or(DataError::MissingData(hash))?;
        let computed = record.compute_hash();
        if computed != hash {
            return Err(StoreError::HashMismatch {
                expected: hash,
                computed,
            }
            .into());
        }
        let cell = Decoder::with_store(Arc::clone(store)).decode(record.encoding)?;
        cell.upgrade_status(record.status);
        trace!(hash = %hash.short_hex(), status = %record.status, "resolved ref");
        Ok(slot.get_or_init(|| cell).clone())
    }

    /// Fill an unresolved indirect ref with a cell already resolved elsewhere.
    pub(crate) fn attach(&self, resolved: &Cell) {
        if let Slot::Indirect { cell, .. } = &*self.slot {
            let _ = cell.set(resolved.clone());
        }
    }

    /// Persistence status of the target; `Unknown` while unresolved.
    pub fn status(&self) -> RefStatus {
        self.cached().map(Cell::status).unwrap_or_default()
    }

    /// Returns `true` if the value cannot be obtained from memory or store.
    pub fn is_missing(&self) -> bool {
        matches!(self.value(), Err(DataError::MissingData(_)))
    }

    /// Write the target and every non-embedded descendant to `store`, then
    /// mark them persisted.
    ///
    /// Status lives on the in-memory cell, not per store, so a graph is
    /// tracked against one store at a time. A cell already persisted to one
    /// store is skipped when persisted to another.
    pub fn persist(&self, store: &dyn CellStore) -> DataResult<RefStatus> {
        self.persist_to(store, RefStatus::Persisted)
    }

    /// Like [`Ref::persist`], but marks the written cells announced.
    pub fn announce(&self, store: &dyn CellStore) -> DataResult<RefStatus> {
        self.persist_to(store, RefStatus::Announced)
    }

    /// Write only the target's own encoding. Descendants are left alone.
    pub fn persist_shallow(&self, store: &dyn CellStore) -> DataResult<RefStatus> {
        self.value()?.write_to(store, RefStatus::Stored)
    }

    fn persist_to(&self, store: &dyn CellStore, target: RefStatus) -> DataResult<RefStatus> {
        enum Work {
            // write after the children are done
            Expand(Cell),
            // inline descendant: walk through, never write
            PassThrough(Cell),
            Write(Cell),
        }

        let root = self.value()?;
        if root.status() >= target {
            return Ok(root.status());
        }
        // indirect refs to one hash resolve to one node, so each hash is
        // fetched once
        let mut resolver = Resolver::default();
        // keyed by node identity: equal cells held in distinct nodes each get
        // their status upgraded
        let mut visited: HashSet<usize> = HashSet::new();
        let mut stack = vec![Work::Expand(root.clone())];
        let mut written = 0usize;
        while let Some(work) = stack.pop() {
            let cell = match work {
                Work::Write(cell) => {
                    cell.write_to(store, target)?;
                    written += 1;
                    continue;
                }
                Work::Expand(cell) => {
                    if cell.status() >= target || !visited.insert(cell.id()) {
                        continue;
                    }
                    stack.push(Work::Write(cell.clone()));
                    cell
                }
                Work::PassThrough(cell) => cell,
            };
            for child in cell.refs() {
                if child.is_embedded() {
                    if let Some(inline) = child.direct_cell() {
                        stack.push(Work::PassThrough(inline.clone()));
                    }
                } else {
                    stack.push(Work::Expand(resolver.resolve(child)?));
                }
            }
        }
        debug!(hash = %root.hash().short_hex(), %target, written, "persisted ref graph");
        Ok(root.status())
    }

    /// Consume the ref, returning its cell if this was the last handle.
    pub(crate) fn into_unique_cell(self) -> Option<Cell> {
        match Arc::into_inner(self.slot)? {
            Slot::Direct(cell) => Some(cell),
            Slot::Indirect { cell, .. } => cell.into_inner(),
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.slot, &b.slot)
    }
}

impl From<Cell> for Ref {
    fn from(cell: Cell) -> Self {
        Self::direct(cell)
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || self.hash() == other.hash()
    }
}

impl Eq for Ref {}

impl PartialOrd for Ref {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ref {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash().cmp(&other.hash())
    }
}

impl std::hash::Hash for Ref {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&Ref::hash(self), state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (&*self.slot, self.cached()) {
            (Slot::Direct(_), _) => "direct",
            (Slot::Indirect { .. }, Some(_)) => "resolved",
            (Slot::Indirect { .. }, None) => "indirect",
        };
        write!(f, "Ref({kind} {})", self.hash().short_hex())
    }
}
