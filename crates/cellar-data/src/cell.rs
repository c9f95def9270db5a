use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use cellar_store::CellStore;
use cellar_types::{Hash, RefStatus};
use tracing::trace;

use crate::codec;
use crate::error::{DataError, DataResult};
use crate::integer::{self, BigInt};
use crate::intern;
use crate::print::{self, DEFAULT_PRINT_LIMIT};
use crate::reference::Ref;
use crate::strings::CvmString;
use crate::tag::{Tag, MAX_BIG_INTEGER_LENGTH, MAX_EMBEDDED_LENGTH, MAX_SYMBOL_LENGTH};
use crate::trie::{TrieLeaf, TrieTree};
use crate::vector::{VectorLeaf, VectorTree};
use crate::vlc;

/// Bit pattern of the only NaN that may be encoded.
pub const CANONICAL_NAN_BITS: u64 = 0x7FF8_0000_0000_0000;

/// The content of a cell. One variant per kind tag.
#[derive(Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Long(i64),
    BigInt(BigInt),
    Double(f64),
    String(CvmString),
    Blob(Bytes),
    Symbol(Box<str>),
    Keyword(Box<str>),
    VectorLeaf(VectorLeaf),
    VectorTree(VectorTree),
    SetLeaf(TrieLeaf),
    SetTree(TrieTree),
    MapLeaf(TrieLeaf),
    MapTree(TrieTree),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Nil => Tag::Nil,
            Self::Bool(false) => Tag::False,
            Self::Bool(true) => Tag::True,
            Self::Long(_) => Tag::Long,
            Self::BigInt(_) => Tag::BigInt,
            Self::Double(_) => Tag::Double,
            Self::String(_) => Tag::String,
            Self::Blob(_) => Tag::Blob,
            Self::Symbol(_) => Tag::Symbol,
            Self::Keyword(_) => Tag::Keyword,
            Self::VectorLeaf(_) => Tag::VectorLeaf,
            Self::VectorTree(_) => Tag::VectorTree,
            Self::SetLeaf(_) => Tag::SetLeaf,
            Self::SetTree(_) => Tag::SetTree,
            Self::MapLeaf(_) => Tag::MapLeaf,
            Self::MapTree(_) => Tag::MapTree,
        }
    }

    /// Child refs in encoding order.
    pub fn refs(&self) -> impl DoubleEndedIterator<Item = &Ref> + '_ {
        let (head, rest): (Option<&Ref>, &[Ref]) = match self {
            Self::VectorLeaf(l) => (l.prefix.as_ref(), &l.items),
            Self::VectorTree(t) => (None, &t.children),
            Self::SetLeaf(l) | Self::MapLeaf(l) => (None, &l.refs),
            Self::SetTree(t) | Self::MapTree(t) => (None, &t.children),
            _ => (None, &[]),
        };
        head.into_iter().chain(rest.iter())
    }

    pub fn ref_count(&self) -> usize {
        match self {
            Self::VectorLeaf(l) => l.prefix.is_some() as usize + l.items.len(),
            Self::VectorTree(t) => t.children.len(),
            Self::SetLeaf(l) | Self::MapLeaf(l) => l.refs.len(),
            Self::SetTree(t) | Self::MapTree(t) => t.children.len(),
            _ => 0,
        }
    }

    /// Move all child refs out, leaving the value childless.
    fn take_refs(&mut self) -> Vec<Ref> {
        match self {
            Self::VectorLeaf(l) => {
                let mut refs = std::mem::take(&mut l.items);
                refs.extend(l.prefix.take());
                refs
            }
            Self::VectorTree(t) => std::mem::take(&mut t.children),
            Self::SetLeaf(l) | Self::MapLeaf(l) => std::mem::take(&mut l.refs),
            Self::SetTree(t) | Self::MapTree(t) => std::mem::take(&mut t.children),
            _ => Vec::new(),
        }
    }

    /// Upper-bound guess of the encoded length, for buffer allocation only.
    pub fn estimated_encoding_size(&self) -> usize {
        const HEADER: usize = 1 + vlc::MAX_VLC_COUNT_LENGTH;
        const PER_REF: usize = 33;
        match self {
            Self::Nil | Self::Bool(_) => 1,
            Self::Long(_) => 1 + vlc::MAX_VLC_LONG_LENGTH,
            Self::BigInt(b) => HEADER + b.byte_length(),
            Self::Double(_) => 9,
            Self::String(s) => HEADER + s.len(),
            Self::Blob(b) => HEADER + b.len(),
            Self::Symbol(n) | Self::Keyword(n) => 2 + n.len(),
            Self::SetTree(_) | Self::MapTree(_) => HEADER + 3 + PER_REF * self.ref_count(),
            _ => HEADER + PER_REF * self.ref_count(),
        }
    }
}

struct Node {
    value: Value,
    encoding: OnceLock<Bytes>,
    hash: OnceLock<Hash>,
    status: AtomicU8,
    writing: AtomicBool,
}

impl Drop for Node {
    // Dismantle uniquely owned descendants with a work list so that dropping
    // a deep structure cannot overflow the stack.
    fn drop(&mut self) {
        let mut pending = self.value.take_refs();
        while let Some(r) = pending.pop() {
            let Some(cell) = r.into_unique_cell() else {
                continue;
            };
            if let Some(mut node) = Arc::into_inner(cell.node) {
                pending.extend(node.value.take_refs());
            }
        }
    }
}

/// An immutable value node.
///
/// A `Cell` is a cheap, shareable handle. The canonical encoding and hash are
/// computed on first use and cached; the persistence status is shared by every
/// handle and every [`Ref`] pointing at the same node.
#[derive(Clone)]
pub struct Cell {
    node: Arc<Node>,
}

impl Cell {
    pub(crate) fn new(value: Value) -> Self {
        Self {
            node: Arc::new(Node {
                value,
                encoding: OnceLock::new(),
                hash: OnceLock::new(),
                status: AtomicU8::new(RefStatus::Unknown.as_u8()),
                writing: AtomicBool::new(false),
            }),
        }
    }

    /// A cell whose encoding is already known, e.g. because it was decoded.
    pub(crate) fn with_encoding(value: Value, encoding: Bytes) -> Self {
        let cell = Self::new(value);
        let _ = cell.node.encoding.set(encoding);
        cell
    }

    pub fn nil() -> Self {
        Self::new(Value::Nil)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Value::Bool(value))
    }

    pub fn long(value: i64) -> Self {
        Self::new(Value::Long(value))
    }

    /// A double; every NaN is normalised to the canonical NaN.
    pub fn double(value: f64) -> Self {
        let value = if value.is_nan() {
            f64::from_bits(CANONICAL_NAN_BITS)
        } else {
            value
        };
        Self::new(Value::Double(value))
    }

    /// An integer from big-endian two's complement bytes.
    ///
    /// Produces a long when the value fits in 64 bits.
    pub fn integer(bytes: &[u8]) -> DataResult<Self> {
        let bytes = integer::minimize(bytes);
        if bytes.len() <= 8 {
            let mut buf = if bytes[0] & 0x80 != 0 { [0xff; 8] } else { [0; 8] };
            buf[8 - bytes.len()..].copy_from_slice(bytes);
            return Ok(Self::long(i64::from_be_bytes(buf)));
        }
        if bytes.len() > MAX_BIG_INTEGER_LENGTH {
            return Err(DataError::Validation(format!(
                "integer of {} bytes exceeds {MAX_BIG_INTEGER_LENGTH}",
                bytes.len()
            )));
        }
        Ok(Self::new(Value::BigInt(BigInt::from_minimal(
            Bytes::copy_from_slice(bytes),
        ))))
    }

    pub fn from_i128(value: i128) -> Self {
        match i64::try_from(value) {
            Ok(v) => Self::long(v),
            Err(_) => Self::new(Value::BigInt(BigInt::from_minimal(Bytes::copy_from_slice(
                integer::minimize(&value.to_be_bytes()),
            )))),
        }
    }

    pub fn string(text: &str) -> Self {
        Self::new(Value::String(CvmString::new(text)))
    }

    pub fn blob(bytes: impl Into<Bytes>) -> Self {
        Self::new(Value::Blob(bytes.into()))
    }

    /// A symbol, shared with any live symbol of the same name.
    pub fn symbol(name: &str) -> DataResult<Self> {
        validate_name(name)?;
        Ok(intern::intern(Tag::Symbol, name, || {
            Self::new(Value::Symbol(name.into()))
        }))
    }

    /// A keyword, shared with any live keyword of the same name.
    pub fn keyword(name: &str) -> DataResult<Self> {
        validate_name(name)?;
        Ok(intern::intern(Tag::Keyword, name, || {
            Self::new(Value::Keyword(name.into()))
        }))
    }

    pub fn value(&self) -> &Value {
        &self.node.value
    }

    pub fn tag(&self) -> Tag {
        self.node.value.tag()
    }

    /// Canonical encoding, computed once.
    ///
    /// Missing encodings of in-memory descendants are filled in bottom-up with
    /// an explicit stack before this cell is encoded.
    pub fn encoding(&self) -> &Bytes {
        if let Some(encoding) = self.node.encoding.get() {
            return encoding;
        }
        let mut stack = vec![(self.clone(), false)];
        while let Some((cell, children_ready)) = stack.pop() {
            if cell.node.encoding.get().is_some() {
                continue;
            }
            if children_ready {
                cell.node.encoding.get_or_init(|| codec::encode_value(cell.value()));
                continue;
            }
            stack.push((cell.clone(), true));
            for child in cell.value().refs().filter_map(Ref::direct_cell) {
                if child.node.encoding.get().is_none() {
                    stack.push((child.clone(), false));
                }
            }
        }
        self.node
            .encoding
            .get_or_init(|| codec::encode_value(self.value()))
    }

    pub fn encoding_length(&self) -> usize {
        self.encoding().len()
    }

    pub fn hash(&self) -> Hash {
        *self.node.hash.get_or_init(|| Hash::compute(self.encoding()))
    }

    /// Whether this cell is inlined into the encoding of any parent.
    pub fn is_embedded(&self) -> bool {
        self.encoding_length() <= MAX_EMBEDDED_LENGTH
    }

    pub fn is_canonical(&self) -> bool {
        match self.value() {
            Value::String(s) => s.is_canonical(),
            _ => true,
        }
    }

    pub fn to_canonical(&self) -> Self {
        match self.value() {
            Value::String(s) if !s.is_canonical() => {
                let cell = Self::new(Value::String(s.to_canonical()));
                if let Some(encoding) = self.node.encoding.get() {
                    let _ = cell.node.encoding.set(encoding.clone());
                }
                cell
            }
            _ => self.clone(),
        }
    }

    pub fn ref_count(&self) -> usize {
        self.value().ref_count()
    }

    pub fn refs(&self) -> impl DoubleEndedIterator<Item = &Ref> + '_ {
        self.value().refs()
    }

    /// Child ref at position `index` in encoding order.
    pub fn child_ref(&self, index: usize) -> Option<&Ref> {
        self.refs().nth(index)
    }

    pub fn estimated_encoding_size(&self) -> usize {
        self.value().estimated_encoding_size()
    }

    pub fn status(&self) -> RefStatus {
        RefStatus::from_u8(self.node.status.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Raise the status to at least `status`, returning the resulting status.
    pub(crate) fn upgrade_status(&self, status: RefStatus) -> RefStatus {
        let prev = self.node.status.fetch_max(status.as_u8(), Ordering::AcqRel);
        RefStatus::from_u8(prev.max(status.as_u8())).unwrap_or_default()
    }

    /// Write this cell's own encoding to `store` at `status`.
    ///
    /// Concurrent callers for the same node serialise on a write claim, so at
    /// most one of them reaches the store for a given target status.
    pub(crate) fn write_to(&self, store: &dyn CellStore, status: RefStatus) -> DataResult<RefStatus> {
        loop {
            let current = self.status();
            if current >= status {
                return Ok(current);
            }
            if self
                .node
                .writing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let result = self.write_claimed(store, status);
                self.node.writing.store(false, Ordering::Release);
                return result;
            }
            std::thread::yield_now();
        }
    }

    fn write_claimed(&self, store: &dyn CellStore, status: RefStatus) -> DataResult<RefStatus> {
        let current = self.status();
        if current >= status {
            return Ok(current);
        }
        let hash = self.hash();
        let recorded = store.put(&hash, self.encoding(), status)?;
        trace!(hash = %hash.short_hex(), %recorded, "wrote cell");
        Ok(self.upgrade_status(recorded))
    }

    /// A direct ref to this cell.
    pub fn to_ref(&self) -> Ref {
        Ref::direct(self.clone())
    }

    /// Returns `true` if both handles point at the same node.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    /// Identity of the shared node, stable while any handle is alive.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }

    pub(crate) fn downgrade(&self) -> WeakCell {
        WeakCell(Arc::downgrade(&self.node))
    }

    // ---- typed accessors ----

    pub fn is_nil(&self) -> bool {
        matches!(self.value(), Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self.value() {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.value() {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.value() {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Bytes> {
        match self.value() {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Name of a symbol or keyword.
    pub fn name(&self) -> Option<&str> {
        match self.value() {
            Value::Symbol(n) | Value::Keyword(n) => Some(n),
            _ => None,
        }
    }

    /// Zero-copy substring of a string cell, by byte offsets.
    pub fn substring(&self, start: usize, end: usize) -> Option<Self> {
        match self.value() {
            Value::String(s) => Some(Self::new(Value::String(s.slice(start, end)?))),
            _ => None,
        }
    }
}

pub(crate) fn validate_name(name: &str) -> DataResult<()> {
    if name.is_empty() {
        return Err(DataError::Validation("empty name".into()));
    }
    if name.len() > MAX_SYMBOL_LENGTH {
        return Err(DataError::Validation(format!(
            "name of {} bytes exceeds {MAX_SYMBOL_LENGTH}",
            name.len()
        )));
    }
    Ok(())
}

/// A non-owning handle used by the interning cache.
pub(crate) struct WeakCell(Weak<Node>);

impl WeakCell {
    pub(crate) fn upgrade(&self) -> Option<Cell> {
        self.0.upgrade().map(|node| Cell { node })
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&Cell::hash(self), state);
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print::print(self, DEFAULT_PRINT_LIMIT).text)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({}: {})", self.tag().name(), print::print(self, 64).text)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::long(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_cached() {
        let c = Cell::string("cached");
        let a = c.encoding().as_ptr();
        let b = c.encoding().as_ptr();
        assert_eq!(a, b);
        assert_eq!(c.hash(), Hash::compute(c.encoding()));
    }

    #[test]
    fn equal_content_equal_hash() {
        assert_eq!(Cell::long(42), Cell::long(42));
        assert_ne!(Cell::long(42), Cell::long(43));
        assert_eq!(Cell::string("x").hash(), Cell::string("x").hash());
        assert_ne!(Cell::string("x"), Cell::keyword("x").unwrap());
    }

    #[test]
    fn nan_is_normalised() {
        let odd_nan = f64::from_bits(0x7FF0_0000_0000_0001);
        assert!(odd_nan.is_nan());
        let c = Cell::double(odd_nan);
        assert_eq!(c.as_double().unwrap().to_bits(), CANONICAL_NAN_BITS);
        assert_eq!(c, Cell::double(f64::NAN));
    }

    #[test]
    fn integer_prefers_long() {
        assert_eq!(Cell::integer(&[0x00, 0x00, 0x2a]).unwrap().as_long(), Some(42));
        assert_eq!(Cell::integer(&[0xff]).unwrap().as_long(), Some(-1));
        assert_eq!(Cell::integer(&[]).unwrap().as_long(), Some(0));
        let big = Cell::integer(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(big.tag(), Tag::BigInt);
        assert_eq!(Cell::from_i128(i64::MIN as i128).as_long(), Some(i64::MIN));
        assert_eq!(Cell::from_i128(1 << 64), big);
    }

    #[test]
    fn oversized_integer_is_rejected() {
        let mut bytes = vec![0x7f; MAX_BIG_INTEGER_LENGTH + 1];
        bytes[0] = 0x01;
        assert!(matches!(
            Cell::integer(&bytes).unwrap_err(),
            DataError::Validation(_)
        ));
    }

    #[test]
    fn invalid_names() {
        assert!(Cell::symbol("").is_err());
        assert!(Cell::keyword(&"k".repeat(256)).is_err());
        assert!(Cell::keyword(&"k".repeat(255)).is_ok());
    }

    #[test]
    fn substring_is_non_canonical_with_identical_encoding() {
        let s = Cell::string("hello world");
        let view = s.substring(0, 5).unwrap();
        assert!(!view.is_canonical());
        let canonical = view.to_canonical();
        assert!(canonical.is_canonical());
        assert_eq!(view.encoding(), canonical.encoding());
        assert_eq!(view, Cell::string("hello"));
    }

    #[test]
    fn status_only_moves_forward() {
        let c = Cell::long(1);
        assert_eq!(c.status(), RefStatus::Unknown);
        assert_eq!(c.upgrade_status(RefStatus::Persisted), RefStatus::Persisted);
        assert_eq!(c.upgrade_status(RefStatus::Stored), RefStatus::Persisted);
        assert_eq!(c.clone().status(), RefStatus::Persisted);
    }

    #[test]
    fn scalars_have_no_refs() {
        assert_eq!(Cell::blob(vec![1, 2, 3]).ref_count(), 0);
        assert!(Cell::nil().child_ref(0).is_none());
    }
}
