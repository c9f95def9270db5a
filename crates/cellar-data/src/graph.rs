//! Whole-graph traversals over refs.
//!
//! Every traversal keeps its pending work on a heap-allocated stack, so graph
//! depth is bounded by memory rather than by the native stack. Indirect refs
//! are resolved through their bound store at most once per traversal and
//! hash; the first resolution failure aborts the traversal.

use std::collections::{HashMap, HashSet};

use cellar_types::{Hash, RefStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cell::Cell;
use crate::error::{DataError, DataResult};
use crate::reference::Ref;
use crate::tag::Tag;

/// Per-traversal cache of cells resolved from a store.
///
/// Indirect refs with the same hash share the first cell resolved for it,
/// so each hash reaches the store at most once.
#[derive(Default)]
pub(crate) struct Resolver {
    resolved: HashMap<Hash, Cell>,
}

impl Resolver {
    pub(crate) fn resolve(&mut self, r: &Ref) -> DataResult<Cell> {
        if let Some(cell) = r.direct_cell() {
            return Ok(cell.clone());
        }
        let hash = r.hash();
        if let Some(cell) = self.resolved.get(&hash) {
            r.attach(cell);
            return Ok(cell.clone());
        }
        let cell = r.value()?;
        self.resolved.insert(hash, cell.clone());
        Ok(cell)
    }
}

/// Reference counts over a ref tree, counting every occurrence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTreeStats {
    /// All refs, root included.
    pub total: u64,
    /// Refs whose target is inlined in its parent.
    pub embedded: u64,
    /// Refs whose target is known to be persisted.
    pub persisted: u64,
}

/// Call `visitor` on every ref reachable from `root`, root first, children
/// left to right. Shared subtrees are visited once per occurrence.
pub fn visit_all_refs<F>(root: &Ref, mut visitor: F) -> DataResult<()>
where
    F: FnMut(&Ref),
{
    let mut resolver = Resolver::default();
    let mut stack = vec![root.clone()];
    while let Some(r) = stack.pop() {
        let cell = resolver.resolve(&r)?;
        visitor(&r);
        stack.extend(cell.refs().rev().cloned());
    }
    Ok(())
}

/// Every distinct ref reachable from `root`, root included, deduplicated by
/// hash.
pub fn accumulate_ref_set(root: &Ref) -> DataResult<HashSet<Ref>> {
    let mut resolver = Resolver::default();
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(r) = stack.pop() {
        if seen.contains(&r) {
            continue;
        }
        let cell = resolver.resolve(&r)?;
        stack.extend(cell.refs().cloned());
        seen.insert(r);
    }
    Ok(seen)
}

/// Number of distinct refs reachable from `root`.
pub fn unique_ref_count(root: &Ref) -> DataResult<usize> {
    Ok(accumulate_ref_set(root)?.len())
}

/// Number of ref occurrences in the tree under `root`, root included.
///
/// Shared subtrees count once per occurrence, so the result grows with the
/// number of paths rather than the number of nodes.
pub fn total_ref_count(root: &Ref) -> DataResult<u64> {
    let mut total = 0u64;
    visit_all_refs(root, |_| total += 1)?;
    Ok(total)
}

pub fn ref_tree_stats(root: &Ref) -> DataResult<RefTreeStats> {
    let mut stats = RefTreeStats::default();
    visit_all_refs(root, |r| {
        stats.total += 1;
        if r.is_embedded() {
            stats.embedded += 1;
        }
        if r.status() >= RefStatus::Persisted {
            stats.persisted += 1;
        }
    })?;
    Ok(stats)
}

/// Up to `limit` distinct hashes reachable from `root` whose cells are not
/// available. Subtrees below a missing cell are not explored.
pub fn find_missing(root: &Ref, limit: usize) -> DataResult<Vec<Hash>> {
    let mut resolver = Resolver::default();
    let mut seen: HashSet<Hash> = HashSet::new();
    let mut missing = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(r) = stack.pop() {
        if missing.len() >= limit {
            break;
        }
        if !seen.insert(r.hash()) {
            continue;
        }
        match resolver.resolve(&r) {
            Ok(cell) => stack.extend(cell.refs().rev().cloned()),
            Err(DataError::MissingData(hash)) => missing.push(hash),
            Err(e) => return Err(e),
        }
    }
    debug!(root = %root.hash().short_hex(), missing = missing.len(), "scanned for missing cells");
    Ok(missing)
}

/// Check every reachable cell against the structural rules that decoding
/// alone cannot see.
///
/// This includes the rule that a child small enough to embed must be
/// embedded: a hash token pointing at such a cell is a second encoding of
/// the same value and is rejected as non-canonical.
pub fn validate(root: &Ref) -> DataResult<()> {
    let mut resolver = Resolver::default();
    let mut seen: HashSet<Hash> = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(r) = stack.pop() {
        if !seen.insert(r.hash()) {
            continue;
        }
        let cell = resolver.resolve(&r)?;
        cell.validate_cell()?;
        for child in cell.refs() {
            if !child.is_direct() && resolver.resolve(child)?.is_embedded() {
                return Err(DataError::non_canonical(
                    Tag::Ref.as_u8(),
                    format!(
                        "{} is referenced by hash but must be embedded",
                        child.hash().short_hex()
                    ),
                ));
            }
        }
        stack.extend(cell.refs().cloned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Map, Vector};
    use cellar_store::MemoryStore;

    #[test]
    fn single_cell() {
        let r = Cell::long(5).to_ref();
        assert_eq!(total_ref_count(&r).unwrap(), 1);
        assert_eq!(unique_ref_count(&r).unwrap(), 1);
        let stats = ref_tree_stats(&r).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.persisted, 0);
    }

    #[test]
    fn visit_order_is_preorder() {
        let inner = Vector::of([Cell::long(2), Cell::long(3)]).into_cell();
        let outer = Vector::of([Cell::long(1), inner.clone(), Cell::long(4)]);
        let mut order = Vec::new();
        visit_all_refs(&outer.to_ref(), |r| {
            order.push(r.value().unwrap().as_long());
        })
        .unwrap();
        assert_eq!(order, vec![None, Some(1), None, Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn traversal_stops_on_missing() {
        let big = Cell::blob(vec![1u8; 1000]);
        let v = Vector::of([big.clone(), Cell::long(1)]);
        let decoded = crate::codec::decode(v.as_cell().encoding().clone()).unwrap();
        let err = total_ref_count(&decoded.to_ref()).unwrap_err();
        assert!(matches!(err, DataError::MissingData(h) if h == big.hash()));
        assert!(accumulate_ref_set(&decoded.to_ref()).unwrap_err().is_missing());
    }

    #[test]
    fn find_missing_respects_limit() {
        let blobs: Vec<Cell> = (0..5u8).map(|i| Cell::blob(vec![i; 300])).collect();
        let v = Vector::of(blobs.clone());
        let decoded = crate::codec::decode(v.as_cell().encoding().clone()).unwrap();
        let all = find_missing(&decoded.to_ref(), 100).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0], blobs[0].hash());
        assert_eq!(find_missing(&decoded.to_ref(), 2).unwrap().len(), 2);
        assert!(find_missing(&v.to_ref(), 10).unwrap().is_empty());
    }

    #[test]
    fn resolves_through_store() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let m = Map::of((0..40).map(|i| (Cell::long(i), Cell::blob(vec![i as u8; 200]))));
        m.to_ref().persist(store.as_ref()).unwrap();
        let r = Ref::for_hash_in(m.as_cell().hash(), store);
        assert_eq!(
            unique_ref_count(&r).unwrap(),
            unique_ref_count(&m.to_ref()).unwrap()
        );
        let stats = ref_tree_stats(&r).unwrap();
        assert_eq!(stats.total, total_ref_count(&m.to_ref()).unwrap());
        assert!(stats.persisted > 0);
        validate(&r).unwrap();
    }

    #[test]
    fn hash_token_for_embeddable_child_is_rejected() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let one = Cell::long(1);
        one.to_ref().persist_shallow(store.as_ref()).unwrap();
        // vector of one element whose only child is written by hash
        let mut bytes = vec![0x80, 0x01, 0x20];
        bytes.extend_from_slice(one.hash().as_bytes());
        let decoded = crate::codec::Decoder::with_store(store).decode(bytes.into()).unwrap();
        assert_ne!(decoded.hash(), Vector::of([one]).as_cell().hash());
        let err = validate(&decoded.to_ref()).unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x20, .. }), "{err}");
    }
}
