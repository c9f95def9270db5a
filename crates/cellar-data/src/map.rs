use std::fmt;
use std::sync::LazyLock;

use crate::cell::{Cell, Value};
use crate::error::{DataError, DataResult};
use crate::reference::Ref;
use crate::trie::{Entry, TrieKind};

const KIND: TrieKind = TrieKind::Map;

static EMPTY: LazyLock<Map> = LazyLock::new(|| Map(KIND.leaf(Vec::new())));

/// A persistent hash map from cells to cells.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Map(Cell);

impl Map {
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// Build a map from pairs. Later pairs win on duplicate keys.
    pub fn of(pairs: impl IntoIterator<Item = (Cell, Cell)>) -> Self {
        Self::from_trie(
            KIND.build(
                pairs
                    .into_iter()
                    .map(|(k, v)| Entry::new(Ref::direct(k), Some(Ref::direct(v))))
                    .collect(),
            ),
        )
    }

    pub fn from_cell(cell: Cell) -> Option<Self> {
        matches!(cell.value(), Value::MapLeaf(_) | Value::MapTree(_)).then_some(Self(cell))
    }

    fn from_trie(cell: Cell) -> Self {
        if KIND.count(&cell) == 0 {
            Self::empty()
        } else {
            Self(cell)
        }
    }

    pub fn as_cell(&self) -> &Cell {
        &self.0
    }

    pub fn into_cell(self) -> Cell {
        self.0
    }

    pub fn to_ref(&self) -> Ref {
        self.0.to_ref()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Cell::ptr_eq(&a.0, &b.0)
    }

    pub fn count(&self) -> u64 {
        KIND.count(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn get(&self, key: &Cell) -> DataResult<Option<Cell>> {
        match KIND.get(&self.0, &key.hash())? {
            Some(entry) => Ok(Some(entry_value(&entry)?.value()?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &Cell) -> DataResult<bool> {
        Ok(KIND.get(&self.0, &key.hash())?.is_some())
    }

    /// Associate `key` with `value`. Returns `self` if already so.
    pub fn assoc(&self, key: Cell, value: Cell) -> DataResult<Self> {
        let entry = Entry::new(Ref::direct(key), Some(Ref::direct(value)));
        Ok(match KIND.insert(&self.0, 0, entry)? {
            Some(cell) => Self(cell),
            None => self.clone(),
        })
    }

    /// Remove `key`. Returns `self` if absent.
    pub fn dissoc(&self, key: &Cell) -> DataResult<Self> {
        Ok(match KIND.remove(&self.0, &key.hash())? {
            Some(cell) => Self::from_trie(cell),
            None => self.clone(),
        })
    }

    /// Key/value pairs in ascending key hash order.
    pub fn entries(&self) -> DataResult<Vec<(Cell, Cell)>> {
        KIND.entries(&self.0)?
            .iter()
            .map(|e| Ok((e.key.value()?, entry_value(e)?.value()?)))
            .collect()
    }

    pub fn keys(&self) -> DataResult<Vec<Cell>> {
        KIND.entries(&self.0)?
            .into_iter()
            .map(|e| e.key.value())
            .collect()
    }
}

fn entry_value(entry: &Entry) -> DataResult<&Ref> {
    entry
        .value
        .as_ref()
        .ok_or_else(|| DataError::Validation("map entry without a value".into()))
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Map({})", self.0)
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
