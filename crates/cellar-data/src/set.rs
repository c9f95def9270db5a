use std::fmt;
use std::sync::LazyLock;

use cellar_types::Hash;

use crate::cell::{Cell, Value};
use crate::error::DataResult;
use crate::reference::Ref;
use crate::trie::{Entry, TrieKind};

const KIND: TrieKind = TrieKind::Set;

static EMPTY: LazyLock<Set> = LazyLock::new(|| Set(KIND.leaf(Vec::new())));

/// A persistent hash set of cells.
///
/// Updates that do not change the contents return the receiver itself, and
/// removing the last element returns the shared [`Set::empty`] instance.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Set(Cell);

impl Set {
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn of(values: impl IntoIterator<Item = Cell>) -> Self {
        Self::from_trie(KIND.build(
            values
                .into_iter()
                .map(|v| Entry::new(Ref::direct(v), None))
                .collect(),
        ))
    }

    /// View a set cell, or `None` for other kinds.
    pub fn from_cell(cell: Cell) -> Option<Self> {
        matches!(cell.value(), Value::SetLeaf(_) | Value::SetTree(_)).then_some(Self(cell))
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

    /// Returns `true` if both sets are the same node.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Cell::ptr_eq(&a.0, &b.0)
    }

    pub fn count(&self) -> u64 {
        KIND.count(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, value: &Cell) -> DataResult<bool> {
        self.contains_hash(&value.hash())
    }

    pub fn contains_hash(&self, hash: &Hash) -> DataResult<bool> {
        Ok(KIND.get(&self.0, hash)?.is_some())
    }

    pub fn include(&self, value: Cell) -> DataResult<Self> {
        self.include_ref(Ref::direct(value))
    }

    pub fn include_ref(&self, element: Ref) -> DataResult<Self> {
        Ok(match KIND.insert(&self.0, 0, Entry::new(element, None))? {
            Some(cell) => Self(cell),
            None => self.clone(),
        })
    }

    pub fn exclude(&self, value: &Cell) -> DataResult<Self> {
        self.exclude_hash(&value.hash())
    }

    pub fn exclude_hash(&self, hash: &Hash) -> DataResult<Self> {
        Ok(match KIND.remove(&self.0, hash)? {
            Some(cell) => Self::from_trie(cell),
            None => self.clone(),
        })
    }

    /// Union.
    pub fn include_all(&self, other: &Set) -> DataResult<Self> {
        if Self::ptr_eq(self, other) || other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        let mut out = self.clone();
        for e in KIND.entries(&other.0)? {
            out = out.include_ref(e.key)?;
        }
        Ok(out)
    }

    /// Difference.
    pub fn exclude_all(&self, other: &Set) -> DataResult<Self> {
        if Self::ptr_eq(self, other) {
            return Ok(Self::empty());
        }
        let mut out = self.clone();
        for e in KIND.entries(&other.0)? {
            if out.is_empty() {
                break;
            }
            out = out.exclude_hash(&e.hash)?;
        }
        Ok(out)
    }

    pub fn conj_all(&self, values: impl IntoIterator<Item = Cell>) -> DataResult<Self> {
        values
            .into_iter()
            .try_fold(self.clone(), |set, v| set.include(v))
    }

    pub fn disj_all(&self, values: impl IntoIterator<Item = Cell>) -> DataResult<Self> {
        values
            .into_iter()
            .try_fold(self.clone(), |set, v| set.exclude(&v))
    }

    /// Intersection. Returns `self` when nothing is dropped.
    pub fn intersect_all(&self, other: &Set) -> DataResult<Self> {
        if Self::ptr_eq(self, other) || self.0 == other.0 {
            return Ok(self.clone());
        }
        let mut kept = Vec::new();
        for e in KIND.entries(&self.0)? {
            if other.contains_hash(&e.hash)? {
                kept.push(e);
            }
        }
        if kept.len() as u64 == self.count() {
            return Ok(self.clone());
        }
        Ok(Self::from_trie(KIND.build(kept)))
    }

    /// Returns `true` if every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Set) -> DataResult<bool> {
        if self.count() > other.count() {
            return Ok(false);
        }
        for e in KIND.entries(&self.0)? {
            if !other.contains_hash(&e.hash)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn contains_all(&self, other: &Set) -> DataResult<bool> {
        other.is_subset(self)
    }

    /// Element refs in ascending hash order.
    pub fn element_refs(&self) -> DataResult<Vec<Ref>> {
        Ok(KIND.entries(&self.0)?.into_iter().map(|e| e.key).collect())
    }

    pub fn to_vec(&self) -> DataResult<Vec<Cell>> {
        KIND.entries(&self.0)?
            .into_iter()
            .map(|e| e.key.value())
            .collect()
    }

    /// Elements in ascending hash order.
    pub fn iter(&self) -> DataResult<std::vec::IntoIter<Cell>> {
        Ok(self.to_vec()?.into_iter())
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Set({})", self.0)
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
