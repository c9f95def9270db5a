//! Persistent vectors.
//!
//! A vector is a [`VectorLeaf`] holding up to 16 trailing elements plus an
//! optional *packed* prefix with every element before them. A packed node is
//! either a leaf of exactly 16 elements or a [`VectorTree`] whose children
//! all have the largest power-of-16 size below the tree's count, except the
//! last child which holds the remainder. The shape is therefore a pure
//! function of the element count.

use std::fmt;
use std::sync::LazyLock;

use crate::cell::{Cell, Value};
use crate::error::{DataError, DataResult};
use crate::reference::Ref;
use crate::tag::BRANCH_FACTOR;

const BF: u64 = BRANCH_FACTOR as u64;

/// Vector node with trailing elements and an optional packed prefix.
#[derive(Debug)]
pub struct VectorLeaf {
    pub(crate) count: u64,
    pub(crate) prefix: Option<Ref>,
    pub(crate) items: Vec<Ref>,
}

/// Packed vector node of more than 16 elements.
#[derive(Debug)]
pub struct VectorTree {
    pub(crate) count: u64,
    pub(crate) children: Vec<Ref>,
}

/// Number of trailing elements held directly by a leaf of `count` elements.
pub(crate) fn tail_length(count: u64) -> usize {
    if count == 0 {
        0
    } else {
        ((count - 1) % BF + 1) as usize
    }
}

/// Size of every child but the last in a packed tree of `count` elements.
pub(crate) fn child_size(count: u64) -> u64 {
    let mut size = BF;
    while size.saturating_mul(BF) < count {
        size *= BF;
    }
    size
}

/// Element count of `cell` if it is a packed node.
pub(crate) fn packed_count(cell: &Cell) -> Option<u64> {
    match cell.value() {
        Value::VectorLeaf(leaf) if leaf.count == BF => Some(BF),
        Value::VectorTree(tree) => Some(tree.count),
        _ => None,
    }
}

/// Resolve a prefix or tree child that must be a packed node of `expected`
/// elements. Indirect children are only checked here, once they arrive.
pub(crate) fn resolve_packed(r: &Ref, expected: u64) -> DataResult<Cell> {
    let cell = r.value()?;
    if packed_count(&cell) == Some(expected) {
        Ok(cell)
    } else {
        Err(DataError::Validation(format!(
            "expected a packed vector node of {expected}, found {} {}",
            cell.tag().name(),
            cell.hash().short_hex()
        )))
    }
}

/// Element count of the packed child at position `k` of a tree of `count`.
fn tree_child_count(count: u64, k: usize) -> u64 {
    let size = child_size(count);
    size.min(count - k as u64 * size)
}

fn leaf(count: u64, prefix: Option<Ref>, items: Vec<Ref>) -> Cell {
    Cell::new(Value::VectorLeaf(VectorLeaf {
        count,
        prefix,
        items,
    }))
}

fn tree(count: u64, children: Vec<Ref>) -> Cell {
    Cell::new(Value::VectorTree(VectorTree { count, children }))
}

/// Build a packed node over a multiple of 16 elements, bottom-up.
fn pack(refs: Vec<Ref>) -> Option<Ref> {
    let mut level: Vec<(Ref, u64)> = refs
        .chunks(BRANCH_FACTOR)
        .map(|chunk| (leaf(BF, None, chunk.to_vec()).to_ref(), BF))
        .collect();
    while level.len() > 1 {
        level = level
            .chunks(BRANCH_FACTOR)
            .map(|group| match group {
                [single] => single.clone(),
                _ => {
                    let count: u64 = group.iter().map(|(_, n)| n).sum();
                    let children = group.iter().map(|(r, _)| r.clone()).collect();
                    (tree(count, children).to_ref(), count)
                }
            })
            .collect();
    }
    level.pop().map(|(r, _)| r)
}

/// Append a full 16-element chunk to the packed node behind `node`.
fn append_chunk(node: &Ref, expected: u64, chunk: Ref) -> DataResult<Ref> {
    let cell = resolve_packed(node, expected)?;
    let appended = match cell.value() {
        Value::VectorLeaf(_) => tree(2 * BF, vec![node.clone(), chunk]),
        Value::VectorTree(t) => {
            let size = child_size(t.count);
            if t.count == size * BF {
                tree(t.count + BF, vec![node.clone(), chunk])
            } else {
                let mut children = t.children.clone();
                let last_count = t.count - size * (children.len() as u64 - 1);
                if last_count == size {
                    children.push(chunk);
                } else if let Some(last) = children.pop() {
                    children.push(append_chunk(&last, last_count, chunk)?);
                }
                tree(t.count + BF, children)
            }
        }
        _ => return Err(not_a_vector(&cell)),
    };
    Ok(appended.to_ref())
}

fn not_a_vector(cell: &Cell) -> DataError {
    DataError::Validation(format!("expected a vector node, found {}", cell.tag().name()))
}

fn assoc_node(node: &Cell, index: u64, item: Ref) -> DataResult<Cell> {
    match node.value() {
        Value::VectorLeaf(l) => {
            let start = l.count - l.items.len() as u64;
            if index >= start {
                let mut items = l.items.clone();
                let slot = items
                    .get_mut((index - start) as usize)
                    .ok_or_else(|| not_a_vector(node))?;
                *slot = item;
                Ok(leaf(l.count, l.prefix.clone(), items))
            } else {
                let prefix = l.prefix.as_ref().ok_or_else(|| not_a_vector(node))?;
                let prefix = assoc_node(&resolve_packed(prefix, start)?, index, item)?;
                Ok(leaf(l.count, Some(prefix.to_ref()), l.items.clone()))
            }
        }
        Value::VectorTree(t) => {
            let size = child_size(t.count);
            let k = (index / size) as usize;
            let child = t.children.get(k).ok_or_else(|| not_a_vector(node))?;
            let child = resolve_packed(child, tree_child_count(t.count, k))?;
            let child = assoc_node(&child, index % size, item)?;
            let mut children = t.children.clone();
            children[k] = child.to_ref();
            Ok(tree(t.count, children))
        }
        _ => Err(not_a_vector(node)),
    }
}

static EMPTY: LazyLock<Vector> = LazyLock::new(|| Vector(leaf(0, None, Vec::new())));

/// A persistent vector of cells.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Vector(Cell);

impl Vector {
    /// The shared empty vector.
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn of(cells: impl IntoIterator<Item = Cell>) -> Self {
        Self::from_refs(cells.into_iter().map(Ref::direct).collect())
    }

    pub fn from_refs(mut refs: Vec<Ref>) -> Self {
        if refs.is_empty() {
            return Self::empty();
        }
        let count = refs.len() as u64;
        let items = refs.split_off(refs.len() - tail_length(count));
        Self(leaf(count, pack(refs), items))
    }

    /// A vector holding `value` `n` times. All positions share one cell.
    pub fn repeat(value: Cell, n: usize) -> Self {
        Self::of(std::iter::repeat(value).take(n))
    }

    /// View a vector cell, or `None` for other kinds.
    pub fn from_cell(cell: Cell) -> Option<Self> {
        matches!(cell.value(), Value::VectorLeaf(_) | Value::VectorTree(_)).then_some(Self(cell))
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

    pub fn count(&self) -> u64 {
        match self.0.value() {
            Value::VectorLeaf(l) => l.count,
            Value::VectorTree(t) => t.count,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn get(&self, index: u64) -> DataResult<Cell> {
        let count = self.count();
        if index >= count {
            return Err(DataError::IndexOutOfBounds { index, count });
        }
        let mut node = self.0.clone();
        let mut i = index;
        loop {
            let next = match node.value() {
                Value::VectorLeaf(l) => {
                    let start = l.count - l.items.len() as u64;
                    if i >= start {
                        let item = l.items.get((i - start) as usize);
                        return item.ok_or_else(|| not_a_vector(&node))?.value();
                    }
                    let prefix = l.prefix.as_ref().ok_or_else(|| not_a_vector(&node))?;
                    resolve_packed(prefix, start)?
                }
                Value::VectorTree(t) => {
                    let size = child_size(t.count);
                    let k = (i / size) as usize;
                    let child = t.children.get(k).ok_or_else(|| not_a_vector(&node))?;
                    i %= size;
                    resolve_packed(child, tree_child_count(t.count, k))?
                }
                _ => return Err(not_a_vector(&node)),
            };
            node = next;
        }
    }

    /// Append one element.
    pub fn conj(&self, value: Cell) -> DataResult<Self> {
        let item = Ref::direct(value);
        let count = self.count();
        let appended = match self.0.value() {
            Value::VectorLeaf(l) if l.items.len() < BRANCH_FACTOR => {
                let mut items = l.items.clone();
                items.push(item);
                leaf(count + 1, l.prefix.clone(), items)
            }
            Value::VectorLeaf(l) => {
                let prefix = match &l.prefix {
                    None => self.to_ref(),
                    Some(prefix) => {
                        let chunk = leaf(BF, None, l.items.clone()).to_ref();
                        append_chunk(prefix, count - BF, chunk)?
                    }
                };
                leaf(count + 1, Some(prefix), vec![item])
            }
            Value::VectorTree(_) => leaf(count + 1, Some(self.to_ref()), vec![item]),
            _ => return Err(not_a_vector(&self.0)),
        };
        Ok(Self(appended))
    }

    /// All elements of `self` followed by all elements of `other`.
    pub fn concat(&self, other: &Vector) -> DataResult<Self> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        let mut out = self.clone();
        for cell in other.iter() {
            out = out.conj(cell?)?;
        }
        Ok(out)
    }

    /// Replace the element at `index`.
    pub fn assoc(&self, index: u64, value: Cell) -> DataResult<Self> {
        let count = self.count();
        if index >= count {
            return Err(DataError::IndexOutOfBounds { index, count });
        }
        Ok(Self(assoc_node(&self.0, index, Ref::direct(value))?))
    }

    /// Elements in order, resolving refs lazily.
    pub fn iter(&self) -> VectorIter {
        VectorIter {
            stack: vec![Pending::Root(self.to_ref())],
        }
    }

    pub fn to_vec(&self) -> DataResult<Vec<Cell>> {
        self.iter().collect()
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector({})", self.0)
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromIterator<Cell> for Vector {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self::of(iter)
    }
}

enum Pending {
    Root(Ref),
    /// Packed node with its expected element count.
    Node(Ref, u64),
    Element(Ref),
}

/// Iterator over vector elements.
///
/// Yields an error and stops if part of the vector cannot be resolved.
pub struct VectorIter {
    stack: Vec<Pending>,
}

impl Iterator for VectorIter {
    type Item = DataResult<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(pending) = self.stack.pop() {
            let node = match pending {
                Pending::Element(r) => return Some(r.value()),
                Pending::Root(r) => match r.value() {
                    Ok(node) => node,
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                },
                Pending::Node(r, expected) => match resolve_packed(&r, expected) {
                    Ok(node) => node,
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                },
            };
            match node.value() {
                Value::VectorLeaf(l) => {
                    self.stack
                        .extend(l.items.iter().rev().cloned().map(Pending::Element));
                    let start = l.count - l.items.len() as u64;
                    self.stack
                        .extend(l.prefix.clone().map(|p| Pending::Node(p, start)));
                }
                Value::VectorTree(t) => {
                    let pending = t.children.iter().enumerate().rev().map(|(k, child)| {
                        Pending::Node(child.clone(), tree_child_count(t.count, k))
                    });
                    self.stack.extend(pending);
                }
                _ => {
                    self.stack.clear();
                    return Some(Err(not_a_vector(&node)));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(n: i64) -> Vector {
        Vector::of((0..n).map(Cell::long))
    }

    fn as_longs(v: &Vector) -> Vec<i64> {
        v.to_vec()
            .unwrap()
            .iter()
            .map(|c| c.as_long().unwrap())
            .collect()
    }

    #[test]
    fn shape_helpers() {
        assert_eq!(tail_length(0), 0);
        assert_eq!(tail_length(1), 1);
        assert_eq!(tail_length(16), 16);
        assert_eq!(tail_length(17), 1);
        assert_eq!(child_size(32), 16);
        assert_eq!(child_size(256), 16);
        assert_eq!(child_size(272), 256);
        assert_eq!(child_size(4096), 256);
        assert_eq!(child_size(u64::MAX - 15), 1 << 60);
    }

    #[test]
    fn empty_is_shared() {
        assert!(Cell::ptr_eq(Vector::empty().as_cell(), Vector::of(Vec::new()).as_cell()));
        assert_eq!(Vector::empty().count(), 0);
        assert!(Vector::empty().get(0).is_err());
    }

    #[test]
    fn get_across_prefix_and_tail() {
        for n in [1, 15, 16, 17, 32, 33, 256, 257, 300, 4097] {
            let v = longs(n);
            assert_eq!(v.count(), n as u64);
            for i in [0, n / 2, n - 1] {
                assert_eq!(v.get(i as u64).unwrap().as_long(), Some(i));
            }
            assert!(matches!(
                v.get(n as u64).unwrap_err(),
                DataError::IndexOutOfBounds { .. }
            ));
        }
    }

    #[test]
    fn conj_matches_bulk_construction() {
        let mut v = Vector::empty();
        for i in 0..600 {
            v = v.conj(Cell::long(i)).unwrap();
            if matches!(i, 0 | 15 | 16 | 31 | 255 | 256 | 271 | 511 | 599) {
                assert_eq!(v.as_cell().hash(), longs(i + 1).as_cell().hash(), "at {i}");
            }
        }
        assert_eq!(as_longs(&v), (0..600).collect::<Vec<_>>());
    }

    #[test]
    fn concat_and_assoc() {
        let a = longs(20);
        let b = Vector::of((20..45).map(Cell::long));
        let c = a.concat(&b).unwrap();
        assert_eq!(c, longs(45));
        assert_eq!(Vector::empty().concat(&b).unwrap(), b);

        let d = c.assoc(3, Cell::string("three")).unwrap();
        assert_eq!(d.get(3).unwrap().as_str(), Some("three"));
        assert_eq!(d.get(44).unwrap().as_long(), Some(44));
        assert_eq!(c.get(3).unwrap().as_long(), Some(3));
        assert!(c.assoc(45, Cell::nil()).is_err());
    }

    #[test]
    fn assoc_in_tail_shares_prefix() {
        let v = longs(40);
        let w = v.assoc(39, Cell::nil()).unwrap();
        let prefix = |v: &Vector| v.as_cell().child_ref(0).unwrap().clone();
        assert!(Ref::ptr_eq(&prefix(&v), &prefix(&w)));
    }

    #[test]
    fn repeat_shares_one_cell() {
        let v = Vector::repeat(Cell::blob(vec![1u8; 100]), 4);
        assert_eq!(v.count(), 4);
        let cells = v.to_vec().unwrap();
        assert!(cells.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn from_cell_filters_kinds() {
        assert!(Vector::from_cell(Cell::long(1)).is_none());
        assert!(Vector::from_cell(longs(3).into_cell()).is_some());
    }

    #[test]
    fn iteration_reports_missing_nodes() {
        let big = Cell::blob(vec![0u8; 500]);
        let v = Vector::of([big]);
        let decoded = crate::codec::decode(v.as_cell().encoding().clone()).unwrap();
        let decoded = Vector::from_cell(decoded).unwrap();
        let results: Vec<_> = decoded.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_missing());
    }
}
