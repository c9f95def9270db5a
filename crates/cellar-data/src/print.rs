//! Bounded, injection-safe text rendering.
//!
//! Strings are quoted and escaped, blobs are printed as hex and unavailable
//! branches as `#ref <hash>`, so printed data can never be mistaken for
//! surrounding output. Rendering works from an explicit stack and stops as
//! soon as the byte budget is used up.

use crate::cell::{Cell, Value};
use crate::reference::Ref;
use crate::tag::Tag;

/// Default print budget in bytes.
pub const DEFAULT_PRINT_LIMIT: usize = 10_000;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Appended when output was cut short.
pub const LIMIT_MARKER: &str = "<<Print limit exceeded>>";

/// Output of [`print`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Printed {
    pub text: String,
    /// `false` if the budget ran out and the text ends with [`LIMIT_MARKER`].
    pub complete: bool,
}

/// Render `cell` into at most `limit` bytes plus the truncation marker.
pub fn print(cell: &Cell, limit: usize) -> Printed {
    print_ref(&cell.to_ref(), limit)
}

/// Render the value behind `root`.
pub fn print_ref(root: &Ref, limit: usize) -> Printed {
    let mut printer = Printer {
        out: String::new(),
        limit,
    };
    let complete = printer.run(root);
    let mut text = printer.out;
    if !complete {
        text.push_str(LIMIT_MARKER);
    }
    Printed { text, complete }
}

enum Work {
    Text(&'static str),
    Value(Ref),
    /// Element of a collection, preceded by a separator unless first.
    Element { item: Ref, first: bool },
    Entry { key: Ref, value: Ref, first: bool },
    VectorNode { node: Ref, first: bool },
    TrieNode { node: Ref, first: bool, map: bool },
}

struct Printer {
    out: String,
    limit: usize,
}

impl Printer {
    fn push_str(&mut self, s: &str) -> bool {
        if self.out.len() + s.len() <= self.limit {
            self.out.push_str(s);
            true
        } else {
            self.push_chars(s.chars())
        }
    }

    fn push_chars(&mut self, chars: impl Iterator<Item = char>) -> bool {
        for c in chars {
            if self.out.len() + c.len_utf8() > self.limit {
                return false;
            }
            self.out.push(c);
        }
        true
    }

    fn push_missing(&mut self, r: &Ref) -> bool {
        self.push_str("#ref ") && self.push_str(&r.hash().to_hex())
    }

    fn separator(&mut self, first: bool) -> bool {
        first || self.push_str(",")
    }

    /// Returns `false` once the budget is exhausted.
    fn run(&mut self, root: &Ref) -> bool {
        let mut stack = vec![Work::Value(root.clone())];
        while let Some(work) = stack.pop() {
            let ok = match work {
                Work::Text(s) => self.push_str(s),
                Work::Element { item, first } => {
                    stack.push(Work::Value(item));
                    self.separator(first)
                }
                Work::Entry { key, value, first } => {
                    stack.push(Work::Value(value));
                    stack.push(Work::Text(" "));
                    stack.push(Work::Value(key));
                    self.separator(first)
                }
                Work::Value(r) => match r.value() {
                    Ok(cell) => self.value(&cell, &mut stack),
                    Err(_) => self.push_missing(&r),
                },
                Work::VectorNode { node, first } => match node.value() {
                    Ok(cell) => {
                        expand_vector(&cell, first, &mut stack);
                        true
                    }
                    Err(_) => self.separator(first) && self.push_missing(&node),
                },
                Work::TrieNode { node, first, map } => match node.value() {
                    Ok(cell) => {
                        expand_trie(&cell, first, map, &mut stack);
                        true
                    }
                    Err(_) => self.separator(first) && self.push_missing(&node),
                },
            };
            if !ok {
                return false;
            }
        }
        true
    }

    fn value(&mut self, cell: &Cell, stack: &mut Vec<Work>) -> bool {
        let open = match cell.value() {
            Value::Nil => return self.push_str("nil"),
            Value::Bool(b) => return self.push_str(if *b { "true" } else { "false" }),
            Value::Long(v) => return self.push_str(&v.to_string()),
            Value::BigInt(b) => {
                // skip the conversion when even the shortest rendering overflows
                if self.out.len() + b.min_decimal_digits() > self.limit {
                    return false;
                }
                return self.push_str(&b.to_decimal());
            }
            Value::Double(d) => return self.push_str(&format_double(*d)),
            Value::String(s) => {
                return self.push_str("\"")
                    && self.push_chars(s.as_str().chars().flat_map(char::escape_debug))
                    && self.push_str("\"");
            }
            Value::Blob(b) => {
                return self.push_str("0x")
                    && self.push_chars(b.iter().flat_map(|byte| {
                        [HEX[(byte >> 4) as usize], HEX[(byte & 0x0f) as usize]].map(char::from)
                    }));
            }
            Value::Symbol(name) => return self.push_chars(name.chars().flat_map(char::escape_debug)),
            Value::Keyword(name) => {
                return self.push_str(":") && self.push_chars(name.chars().flat_map(char::escape_debug));
            }
            Value::VectorLeaf(_) | Value::VectorTree(_) => {
                stack.push(Work::Text("]"));
                stack.push(Work::VectorNode {
                    node: cell.to_ref(),
                    first: true,
                });
                "["
            }
            Value::SetLeaf(_) | Value::SetTree(_) | Value::MapLeaf(_) | Value::MapTree(_) => {
                let map = matches!(cell.tag(), Tag::MapLeaf | Tag::MapTree);
                stack.push(Work::Text("}"));
                stack.push(Work::TrieNode {
                    node: cell.to_ref(),
                    first: true,
                    map,
                });
                if map {
                    "{"
                } else {
                    "#{"
                }
            }
        };
        self.push_str(open)
    }
}

fn expand_vector(cell: &Cell, first: bool, stack: &mut Vec<Work>) {
    match cell.value() {
        Value::VectorLeaf(l) => {
            let tail_first = first && l.prefix.is_none();
            for (i, item) in l.items.iter().enumerate().rev() {
                stack.push(Work::Element {
                    item: item.clone(),
                    first: tail_first && i == 0,
                });
            }
            if let Some(prefix) = &l.prefix {
                stack.push(Work::VectorNode {
                    node: prefix.clone(),
                    first,
                });
            }
        }
        Value::VectorTree(t) => {
            for (i, child) in t.children.iter().enumerate().rev() {
                stack.push(Work::VectorNode {
                    node: child.clone(),
                    first: first && i == 0,
                });
            }
        }
        _ => stack.push(Work::Element {
            item: cell.to_ref(),
            first,
        }),
    }
}

fn expand_trie(cell: &Cell, first: bool, map: bool, stack: &mut Vec<Work>) {
    match cell.value() {
        Value::SetLeaf(l) | Value::MapLeaf(l) => {
            let stride = if map { 2 } else { 1 };
            for (i, chunk) in l.refs.chunks(stride).enumerate().rev() {
                let first = first && i == 0;
                match chunk {
                    [key, value] => stack.push(Work::Entry {
                        key: key.clone(),
                        value: value.clone(),
                        first,
                    }),
                    _ => stack.push(Work::Element {
                        item: chunk[0].clone(),
                        first,
                    }),
                }
            }
        }
        Value::SetTree(t) | Value::MapTree(t) => {
            for (i, child) in t.children.iter().enumerate().rev() {
                stack.push(Work::TrieNode {
                    node: child.clone(),
                    first: first && i == 0,
                    map,
                });
            }
        }
        _ => stack.push(Work::Element {
            item: cell.to_ref(),
            first,
        }),
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "##NaN".into()
    } else if d == f64::INFINITY {
        "##Inf".into()
    } else if d == f64::NEG_INFINITY {
        "##-Inf".into()
    } else {
        format!("{d:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Map, Set, Vector};

    fn text(cell: &Cell) -> String {
        let printed = print(cell, DEFAULT_PRINT_LIMIT);
        assert!(printed.complete);
        printed.text
    }

    #[test]
    fn scalars() {
        assert_eq!(text(&Cell::nil()), "nil");
        assert_eq!(text(&Cell::bool(true)), "true");
        assert_eq!(text(&Cell::long(-12)), "-12");
        assert_eq!(text(&Cell::double(1.5)), "1.5");
        assert_eq!(text(&Cell::double(f64::NAN)), "##NaN");
        assert_eq!(text(&Cell::double(f64::NEG_INFINITY)), "##-Inf");
        assert_eq!(text(&Cell::blob(vec![0xde, 0xad])), "0xdead");
        assert_eq!(text(&Cell::keyword("foo").unwrap()), ":foo");
        assert_eq!(text(&Cell::from_i128(1 << 64)), "18446744073709551616");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(text(&Cell::string("a\"b\n")), r#""a\"b\n""#);
    }

    #[test]
    fn collections() {
        let v = Vector::of([Cell::long(1), Cell::string("x"), Cell::nil()]);
        assert_eq!(text(v.as_cell()), r#"[1,"x",nil]"#);
        assert_eq!(text(Vector::empty().as_cell()), "[]");
        assert_eq!(text(Set::of([Cell::long(7)]).as_cell()), "#{7}");
        assert_eq!(text(Map::of([(Cell::long(1), Cell::long(2))]).as_cell()), "{1 2}");
        assert_eq!(text(Map::empty().as_cell()), "{}");
    }

    #[test]
    fn large_vector_prints_in_order() {
        let v = Vector::of((0..40).map(Cell::long));
        let expected = format!(
            "[{}]",
            (0..40).map(|i| i.to_string()).collect::<Vec<_>>().join(",")
        );
        assert_eq!(text(v.as_cell()), expected);
    }

    #[test]
    fn nested_sets_have_separators() {
        let s = Set::of((0..40).map(Cell::long));
        let printed = text(s.as_cell());
        assert_eq!(printed.matches(',').count(), 39);
    }

    #[test]
    fn missing_branches_print_as_hash() {
        let big = Cell::blob(vec![0u8; 400]);
        let v = Vector::of([Cell::long(1), big.clone()]);
        let decoded = crate::codec::decode(v.as_cell().encoding().clone()).unwrap();
        assert_eq!(text(&decoded), format!("[1,#ref {}]", big.hash()));
    }

    #[test]
    fn limit_truncates() {
        let v = Vector::of((0..10_000).map(Cell::long));
        let printed = print(v.as_cell(), 50);
        assert!(!printed.complete);
        assert!(printed.text.ends_with(LIMIT_MARKER));
        assert!(printed.text.len() <= 50 + LIMIT_MARKER.len());
    }

    #[test]
    fn oversized_big_int_stops_before_rendering() {
        let wide = Cell::integer(&[0x40; 4096]).unwrap();
        let printed = print(&Vector::of([Cell::long(1), wide]).into_cell(), 100);
        assert!(!printed.complete);
        assert_eq!(printed.text, format!("[1,{LIMIT_MARKER}"));
    }

    #[test]
    fn huge_blob_is_cut() {
        let printed = print(&Cell::blob(vec![0xab; 1_000_000]), 10);
        assert_eq!(printed.text, format!("0xabababab{LIMIT_MARKER}"));
    }
}
