//! Structural validation.
//!
//! Decoding checks everything visible in a single encoding. The rules here
//! need a look at child cells (tree shapes, digit placement, counts) or are
//! semantic rather than syntactic (symbol names), so they run as an explicit
//! pass over data received from elsewhere.

use crate::cell::{validate_name, Cell, Value};
use crate::error::{DataError, DataResult};
use crate::graph;
use crate::tag::BRANCH_FACTOR;
use crate::trie::{Node, TrieKind, TrieTree};
use crate::vector;

fn invalid(msg: impl Into<String>) -> DataError {
    DataError::Validation(msg.into())
}

impl Cell {
    /// Validate this cell and every cell reachable from it.
    pub fn validate(&self) -> DataResult<()> {
        graph::validate(&self.to_ref())
    }

    /// Validate this cell alone, resolving direct children where their shape
    /// matters.
    pub fn validate_cell(&self) -> DataResult<()> {
        match self.value() {
            Value::Symbol(name) | Value::Keyword(name) => validate_name(name),
            Value::VectorLeaf(l) => {
                if l.items.len() != vector::tail_length(l.count) {
                    return Err(invalid(format!(
                        "vector of {} holds {} trailing elements",
                        l.count,
                        l.items.len()
                    )));
                }
                let expected = l.count - l.items.len() as u64;
                match &l.prefix {
                    None if expected == 0 => Ok(()),
                    Some(prefix) if expected > 0 => {
                        vector::resolve_packed(prefix, expected).map(drop)
                    }
                    _ => Err(invalid("vector prefix does not match count")),
                }
            }
            Value::VectorTree(t) => {
                let size = vector::child_size(t.count);
                if t.children.len() as u64 != t.count.div_ceil(size) {
                    return Err(invalid("vector tree has the wrong number of children"));
                }
                for (i, child) in t.children.iter().enumerate() {
                    let expected = size.min(t.count - i as u64 * size);
                    vector::resolve_packed(child, expected)?;
                }
                Ok(())
            }
            Value::SetLeaf(l) | Value::MapLeaf(l) => {
                let kind = trie_kind(self);
                if l.refs.len() % kind.stride() != 0 {
                    return Err(invalid("map leaf with a dangling key"));
                }
                let hashes: Vec<_> = kind.leaf_entries(l).map(|e| e.hash).collect();
                if hashes.len() > BRANCH_FACTOR {
                    return Err(invalid("trie leaf with more than 16 entries"));
                }
                if !hashes.windows(2).all(|w| w[0] < w[1]) {
                    return Err(invalid("trie leaf out of hash order"));
                }
                Ok(())
            }
            Value::SetTree(t) | Value::MapTree(t) => check_trie_tree(trie_kind(self), t),
            _ => Ok(()),
        }
    }
}

fn trie_kind(cell: &Cell) -> TrieKind {
    match cell.value() {
        Value::MapLeaf(_) | Value::MapTree(_) => TrieKind::Map,
        _ => TrieKind::Set,
    }
}

fn check_trie_tree(kind: TrieKind, tree: &TrieTree) -> DataResult<()> {
    if tree.count as usize <= BRANCH_FACTOR {
        return Err(invalid("trie tree small enough to be a leaf"));
    }
    if tree.children.len() != tree.mask.count_ones() as usize {
        return Err(invalid("trie tree mask does not match its children"));
    }
    let shift = tree.shift as usize;
    let mut total = 0u64;
    for (digit, child) in tree.digits().zip(&tree.children) {
        let child = child.value()?;
        match kind.view(&child)? {
            Node::Leaf(l) => {
                let mut n = 0u64;
                for e in kind.leaf_entries(l) {
                    if e.hash.digit(shift) != digit {
                        return Err(invalid(format!(
                            "entry {} filed under digit {digit}",
                            e.hash.short_hex()
                        )));
                    }
                    n += 1;
                }
                if n == 0 {
                    return Err(invalid("empty trie child"));
                }
                total += n;
            }
            Node::Tree(t) => {
                if t.shift as usize != shift + 1 {
                    return Err(invalid("trie child at the wrong depth"));
                }
                total += t.count;
            }
        }
    }
    if total != tree.count {
        return Err(invalid(format!(
            "trie tree claims {} entries but holds {total}",
            tree.count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::{Map, Set, Vector};

    #[test]
    fn well_formed_structures_pass() {
        Vector::of((0..300).map(Cell::long)).as_cell().validate().unwrap();
        Set::of((0..300).map(Cell::long)).as_cell().validate().unwrap();
        Map::of((0..50).map(|i| (Cell::long(i), Cell::nil())))
            .as_cell()
            .validate()
            .unwrap();
        Cell::symbol("ok").unwrap().validate().unwrap();
    }

    #[test]
    fn empty_symbol_decodes_but_fails_validation() {
        let cell = decode(vec![0x32, 0x00]).unwrap();
        assert!(matches!(cell.validate(), Err(DataError::Validation(_))));
    }

    fn forged_tree(edit: impl FnOnce(&TrieTree) -> TrieTree) -> Cell {
        let set = Set::of((0..17).map(Cell::long));
        let Value::SetTree(t) = set.as_cell().value() else {
            panic!("expected tree");
        };
        Cell::new(Value::SetTree(edit(t)))
    }

    #[test]
    fn misfiled_trie_entries_fail_validation() {
        let forged = forged_tree(|t| TrieTree {
            count: t.count,
            shift: t.shift,
            mask: t.mask.rotate_left(1),
            children: t.children.clone(),
        });
        assert!(matches!(forged.validate_cell(), Err(DataError::Validation(_))));
    }

    #[test]
    fn wrong_trie_count_fails_validation() {
        let forged = forged_tree(|t| TrieTree {
            count: t.count + 1,
            shift: t.shift,
            mask: t.mask,
            children: t.children.clone(),
        });
        let err = forged.validate_cell().unwrap_err();
        assert!(err.to_string().contains("claims 18"));
    }

    #[test]
    fn vector_with_wrong_tail_fails_validation() {
        let v = Vector::of((0..20).map(Cell::long));
        let Value::VectorLeaf(l) = v.as_cell().value() else {
            panic!("expected leaf");
        };
        let forged = Cell::new(Value::VectorLeaf(vector::VectorLeaf {
            count: 21,
            prefix: l.prefix.clone(),
            items: l.items.clone(),
        }));
        assert!(forged.validate_cell().is_err());
    }
}
