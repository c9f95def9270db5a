//! Hash tries shared by sets and maps.
//!
//! Entries are ordered by the hash of their key. A node with at most 16
//! entries is a [`TrieLeaf`] listing them in ascending hash order. A larger
//! node is a [`TrieTree`] that splits its entries on hex digit `shift` of the
//! key hash; each child is built the same way at `shift + 1`. Because the
//! shape depends only on the set of key hashes, equal contents always give
//! equal encodings.
//!
//! The functions here return `None` when an update leaves the trie
//! unchanged, which lets callers hand back the original collection.

use std::cmp::Ordering;

use cellar_types::Hash;

use crate::cell::{Cell, Value};
use crate::error::{DataError, DataResult};
use crate::reference::Ref;
use crate::tag::BRANCH_FACTOR;

/// Trie node holding up to 16 entries in ascending key hash order.
///
/// Set leaves hold one ref per entry, map leaves a key ref followed by a
/// value ref.
#[derive(Debug)]
pub struct TrieLeaf {
    pub(crate) refs: Vec<Ref>,
}

/// Trie node partitioning more than 16 entries by one hex digit.
#[derive(Debug)]
pub struct TrieTree {
    pub(crate) count: u64,
    pub(crate) shift: u8,
    pub(crate) mask: u16,
    pub(crate) children: Vec<Ref>,
}

impl TrieTree {
    /// Position in `children` of the child for hex digit `digit`.
    pub(crate) fn child_index(&self, digit: usize) -> Option<usize> {
        let bit = 1u16 << digit;
        (self.mask & bit != 0).then(|| (self.mask & (bit - 1)).count_ones() as usize)
    }

    /// Hex digits present, in child order.
    pub(crate) fn digits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..BRANCH_FACTOR).filter(|d| self.mask & (1 << d) != 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TrieKind {
    Set,
    Map,
}

pub(crate) enum Node<'a> {
    Leaf(&'a TrieLeaf),
    Tree(&'a TrieTree),
}

/// One set element or map entry, with its key hash.
#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub(crate) key: Ref,
    pub(crate) value: Option<Ref>,
    pub(crate) hash: Hash,
}

impl Entry {
    pub(crate) fn new(key: Ref, value: Option<Ref>) -> Self {
        let hash = key.hash();
        Self { key, value, hash }
    }

    fn same_value(&self, other: &Entry) -> bool {
        self.value.as_ref().map(Ref::hash) == other.value.as_ref().map(Ref::hash)
    }
}

impl TrieKind {
    pub(crate) fn stride(self) -> usize {
        match self {
            Self::Set => 1,
            Self::Map => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Map => "map",
        }
    }

    /// Leaf from entries already in ascending hash order.
    pub(crate) fn leaf(self, entries: Vec<Entry>) -> Cell {
        let mut refs = Vec::with_capacity(entries.len() * self.stride());
        for e in entries {
            refs.push(e.key);
            refs.extend(e.value);
        }
        let leaf = TrieLeaf { refs };
        Cell::new(match self {
            Self::Set => Value::SetLeaf(leaf),
            Self::Map => Value::MapLeaf(leaf),
        })
    }

    fn tree(self, count: u64, shift: u8, mask: u16, children: Vec<Ref>) -> Cell {
        let tree = TrieTree {
            count,
            shift,
            mask,
            children,
        };
        Cell::new(match self {
            Self::Set => Value::SetTree(tree),
            Self::Map => Value::MapTree(tree),
        })
    }

    pub(crate) fn view(self, cell: &Cell) -> DataResult<Node<'_>> {
        match (self, cell.value()) {
            (Self::Set, Value::SetLeaf(l)) | (Self::Map, Value::MapLeaf(l)) => Ok(Node::Leaf(l)),
            (Self::Set, Value::SetTree(t)) | (Self::Map, Value::MapTree(t)) => Ok(Node::Tree(t)),
            _ => Err(DataError::Validation(format!(
                "expected a {} node, found {}",
                self.name(),
                cell.tag().name()
            ))),
        }
    }

    pub(crate) fn leaf_entries(self, leaf: &TrieLeaf) -> impl Iterator<Item = Entry> + '_ {
        leaf.refs
            .chunks(self.stride())
            .map(|chunk| Entry::new(chunk[0].clone(), chunk.get(1).cloned()))
    }

    /// Number of entries under `cell`.
    pub(crate) fn count(self, cell: &Cell) -> u64 {
        match self.view(cell) {
            Ok(Node::Leaf(l)) => (l.refs.len() / self.stride()) as u64,
            Ok(Node::Tree(t)) => t.count,
            Err(_) => 0,
        }
    }

    /// Find the entry whose key hashes to `hash`.
    pub(crate) fn get(self, root: &Cell, hash: &Hash) -> DataResult<Option<Entry>> {
        let mut node = root.clone();
        loop {
            let next = match self.view(&node)? {
                Node::Leaf(l) => return Ok(self.leaf_entries(l).find(|e| e.hash == *hash)),
                Node::Tree(t) => match t.child_index(hash.digit(t.shift as usize)) {
                    Some(i) => t.children[i].value()?,
                    None => return Ok(None),
                },
            };
            node = next;
        }
    }

    /// Add or replace an entry. `None` if nothing changed.
    pub(crate) fn insert(self, node: &Cell, shift: u8, entry: Entry) -> DataResult<Option<Cell>> {
        match self.view(node)? {
            Node::Leaf(l) => {
                let mut entries: Vec<Entry> = self.leaf_entries(l).collect();
                match entries.binary_search_by(|e| e.hash.cmp(&entry.hash)) {
                    Ok(i) if self == Self::Set || entries[i].same_value(&entry) => return Ok(None),
                    Ok(i) => entries[i] = entry,
                    Err(i) => entries.insert(i, entry),
                }
                Ok(Some(self.build_sorted(entries, shift)))
            }
            Node::Tree(t) => {
                let digit = entry.hash.digit(t.shift as usize);
                let mut children = t.children.clone();
                let mut mask = t.mask;
                let added = match t.child_index(digit) {
                    Some(i) => {
                        let old = children[i].value()?;
                        let Some(new) = self.insert(&old, t.shift + 1, entry)? else {
                            return Ok(None);
                        };
                        let added = self.count(&new) - self.count(&old);
                        children[i] = new.to_ref();
                        added
                    }
                    None => {
                        mask |= 1 << digit;
                        let i = (mask & ((1u16 << digit) - 1)).count_ones() as usize;
                        children.insert(i, self.leaf(vec![entry]).to_ref());
                        1
                    }
                };
                Ok(Some(self.tree(t.count + added, t.shift, mask, children)))
            }
        }
    }

    /// Remove the entry keyed by `hash`. `None` if it was absent.
    pub(crate) fn remove(self, node: &Cell, hash: &Hash) -> DataResult<Option<Cell>> {
        match self.view(node)? {
            Node::Leaf(l) => {
                let mut entries: Vec<Entry> = self.leaf_entries(l).collect();
                let Ok(i) = entries.binary_search_by(|e| e.hash.cmp(hash)) else {
                    return Ok(None);
                };
                entries.remove(i);
                Ok(Some(self.leaf(entries)))
            }
            Node::Tree(t) => {
                let digit = hash.digit(t.shift as usize);
                let Some(i) = t.child_index(digit) else {
                    return Ok(None);
                };
                let old = t.children[i].value()?;
                let Some(new) = self.remove(&old, hash)? else {
                    return Ok(None);
                };
                let count = t.count - 1;
                if count as usize <= BRANCH_FACTOR {
                    let mut entries = Vec::with_capacity(count as usize);
                    for (j, child) in t.children.iter().enumerate() {
                        let child = if j == i { new.clone() } else { child.value()? };
                        self.collect(&child, &mut entries)?;
                    }
                    return Ok(Some(self.leaf(entries)));
                }
                let mut children = t.children.clone();
                let mut mask = t.mask;
                if self.count(&new) == 0 {
                    children.remove(i);
                    mask &= !(1 << digit);
                } else {
                    children[i] = new.to_ref();
                }
                Ok(Some(self.tree(count, t.shift, mask, children)))
            }
        }
    }

    /// Build a node from entries sorted by hash with no duplicate keys.
    fn build_sorted(self, entries: Vec<Entry>, shift: u8) -> Cell {
        if entries.len() <= BRANCH_FACTOR {
            return self.leaf(entries);
        }
        let count = entries.len() as u64;
        let mut buckets: Vec<Vec<Entry>> = vec![Vec::new(); BRANCH_FACTOR];
        for e in entries {
            buckets[e.hash.digit(shift as usize)].push(e);
        }
        let mut mask = 0u16;
        let mut children = Vec::new();
        for (digit, bucket) in buckets.into_iter().enumerate() {
            if !bucket.is_empty() {
                mask |= 1 << digit;
                children.push(self.build_sorted(bucket, shift + 1).to_ref());
            }
        }
        self.tree(count, shift, mask, children)
    }

    /// Build a trie from arbitrary entries. Later entries win on duplicate keys.
    pub(crate) fn build(self, mut entries: Vec<Entry>) -> Cell {
        entries.sort_by(by_hash);
        let mut unique: Vec<Entry> = Vec::with_capacity(entries.len());
        for e in entries {
            match unique.last_mut() {
                Some(last) if last.hash == e.hash => *last = e,
                _ => unique.push(e),
            }
        }
        self.build_sorted(unique, 0)
    }

    /// Append every entry under `root` to `out` in ascending hash order.
    pub(crate) fn collect(self, root: &Cell, out: &mut Vec<Entry>) -> DataResult<()> {
        let mut stack = vec![root.clone()];
        while let Some(cell) = stack.pop() {
            match self.view(&cell)? {
                Node::Leaf(l) => out.extend(self.leaf_entries(l)),
                Node::Tree(t) => {
                    for child in t.children.iter().rev() {
                        stack.push(child.value()?);
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn entries(self, root: &Cell) -> DataResult<Vec<Entry>> {
        let mut out = Vec::with_capacity(self.count(root) as usize);
        self.collect(root, &mut out)?;
        Ok(out)
    }
}

/// Total order on entries used by the sorted leaf layout.
pub(crate) fn by_hash(a: &Entry, b: &Entry) -> Ordering {
    a.hash.cmp(&b.hash)
}
