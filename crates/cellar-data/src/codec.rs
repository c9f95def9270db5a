//! Canonical binary encoding.
//!
//! ```text
//! cell      = tag payload
//! child     = cell                  ; embedded: encoding <= 140 bytes
//!           | 0x20 hash[32]         ; everything else
//! ```
//!
//! Encoding is a pure function of the value. Decoding accepts exactly the
//! canonical encodings and reports everything else as either a format error
//! (malformed) or a non-canonical error (well formed but not the unique
//! encoding of its value).

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use cellar_store::CellStore;
use cellar_types::{Hash, HASH_LENGTH};
use tracing::debug;

use crate::cell::{Cell, Value, CANONICAL_NAN_BITS};
use crate::error::{DataError, DataResult};
use crate::integer::{self, BigInt};
use crate::reference::Ref;
use crate::strings::CvmString;
use crate::tag::{Tag, BRANCH_FACTOR, MAX_BIG_INTEGER_LENGTH, MAX_EMBEDDED_LENGTH};
use crate::trie::{TrieLeaf, TrieTree};
use crate::vector::{self, VectorLeaf, VectorTree};
use crate::vlc::{self, VlcError};

/// Canonical encoding of a cell.
pub fn encode(cell: &Cell) -> Bytes {
    cell.encoding().clone()
}

/// Decode a complete canonical encoding. Indirect children stay unresolved.
pub fn decode(encoding: impl Into<Bytes>) -> DataResult<Cell> {
    Decoder::new().decode(encoding.into())
}

/// Encode a value whose in-memory children already have cached encodings.
pub(crate) fn encode_value(value: &Value) -> Bytes {
    let mut buf = BytesMut::with_capacity(value.estimated_encoding_size());
    buf.put_u8(value.tag().as_u8());
    match value {
        Value::Nil | Value::Bool(_) => {}
        Value::Long(v) => vlc::write_long(&mut buf, *v),
        Value::BigInt(b) => {
            vlc::write_count(&mut buf, b.byte_length() as u64);
            buf.put_slice(b.as_bytes());
        }
        Value::Double(d) => {
            let bits = if d.is_nan() { CANONICAL_NAN_BITS } else { d.to_bits() };
            buf.put_u64(bits);
        }
        Value::String(s) => {
            vlc::write_count(&mut buf, s.len() as u64);
            buf.put_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            vlc::write_count(&mut buf, b.len() as u64);
            buf.put_slice(b);
        }
        Value::Symbol(name) | Value::Keyword(name) => {
            buf.put_u8(name.len() as u8);
            buf.put_slice(name.as_bytes());
        }
        Value::VectorLeaf(leaf) => {
            vlc::write_count(&mut buf, leaf.count);
            write_refs(&mut buf, value);
        }
        Value::VectorTree(tree) => {
            vlc::write_count(&mut buf, tree.count);
            write_refs(&mut buf, value);
        }
        Value::SetLeaf(leaf) => {
            vlc::write_count(&mut buf, leaf.refs.len() as u64);
            write_refs(&mut buf, value);
        }
        Value::MapLeaf(leaf) => {
            vlc::write_count(&mut buf, (leaf.refs.len() / 2) as u64);
            write_refs(&mut buf, value);
        }
        Value::SetTree(tree) | Value::MapTree(tree) => {
            vlc::write_count(&mut buf, tree.count);
            buf.put_u8(tree.shift);
            buf.put_u16(tree.mask);
            write_refs(&mut buf, value);
        }
    }
    buf.freeze()
}

fn write_refs(buf: &mut BytesMut, value: &Value) {
    for r in value.refs() {
        write_ref(buf, r);
    }
}

fn write_ref(buf: &mut BytesMut, r: &Ref) {
    match r.embedded_cell() {
        Some(cell) => buf.put_slice(cell.encoding()),
        None => {
            buf.put_u8(Tag::Ref.as_u8());
            buf.put_slice(r.hash().as_bytes());
        }
    }
}

/// Decodes canonical encodings into cells.
///
/// A decoder bound to a store produces indirect refs that resolve from it.
#[derive(Clone, Default)]
pub struct Decoder {
    store: Option<Arc<dyn CellStore>>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<dyn CellStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Decode `encoding`, which must contain exactly one cell.
    pub fn decode(&self, encoding: Bytes) -> DataResult<Cell> {
        let mut reader = Reader::new(encoding);
        let result = self.read_cell(&mut reader).and_then(|cell| {
            if reader.remaining() > 0 {
                return Err(DataError::format(format!(
                    "{} trailing bytes after {}",
                    reader.remaining(),
                    cell.tag().name()
                )));
            }
            Ok(cell)
        });
        if let Err(e) = &result {
            debug!(error = %e, len = reader.bytes.len(), "rejected encoding");
        }
        result
    }

    fn read_cell(&self, r: &mut Reader) -> DataResult<Cell> {
        let start = r.pos;
        let byte = r.u8()?;
        let tag = Tag::from_u8(byte)
            .ok_or_else(|| DataError::format(format!("unknown tag {byte:#04x}")))?;
        let value = match tag {
            Tag::Nil => Value::Nil,
            Tag::False => Value::Bool(false),
            Tag::True => Value::Bool(true),
            Tag::Long => Value::Long(r.long(tag)?),
            Tag::BigInt => Value::BigInt(read_big_int(r)?),
            Tag::Double => {
                let bits = u64::from_be_bytes(r.array::<8>()?);
                let d = f64::from_bits(bits);
                if d.is_nan() && bits != CANONICAL_NAN_BITS {
                    return Err(DataError::non_canonical(byte, "non-canonical NaN"));
                }
                Value::Double(d)
            }
            Tag::String => {
                let len = r.count(tag)?;
                Value::String(CvmString::from_utf8(r.take(len)?)?)
            }
            Tag::Blob => {
                let len = r.count(tag)?;
                Value::Blob(r.take(len)?)
            }
            Tag::Symbol | Tag::Keyword => {
                let len = r.u8()? as u64;
                let raw = r.take(len)?;
                let name = std::str::from_utf8(&raw)
                    .map_err(|e| DataError::format(format!("invalid UTF-8 in name: {e}")))?;
                if tag == Tag::Symbol {
                    Value::Symbol(name.into())
                } else {
                    Value::Keyword(name.into())
                }
            }
            Tag::VectorLeaf => Value::VectorLeaf(self.read_vector_leaf(r)?),
            Tag::VectorTree => Value::VectorTree(self.read_vector_tree(r)?),
            Tag::SetLeaf => Value::SetLeaf(self.read_trie_leaf(r, tag, 1)?),
            Tag::MapLeaf => Value::MapLeaf(self.read_trie_leaf(r, tag, 2)?),
            Tag::SetTree => Value::SetTree(self.read_trie_tree(r, tag)?),
            Tag::MapTree => Value::MapTree(self.read_trie_tree(r, tag)?),
            Tag::Ref => {
                return Err(DataError::format("ref token outside of a composite cell"));
            }
        };
        Ok(Cell::with_encoding(value, r.bytes.slice(start..r.pos)))
    }

    fn read_ref(&self, r: &mut Reader) -> DataResult<Ref> {
        if r.peek()? == Tag::Ref.as_u8() {
            r.pos += 1;
            let hash = Hash::from_bytes(r.array::<HASH_LENGTH>()?);
            return Ok(Ref::indirect(hash, self.store.clone()));
        }
        // inline children are bounded by the embedding limit, which also
        // bounds how deep this can recurse
        let end = r.end;
        r.end = end.min(r.pos + MAX_EMBEDDED_LENGTH);
        let cell = self.read_cell(r);
        r.end = end;
        Ok(Ref::direct(cell?))
    }

    fn read_refs(&self, r: &mut Reader, n: usize) -> DataResult<Vec<Ref>> {
        // every child takes at least one byte
        if n > r.remaining() {
            return Err(DataError::format(format!("{n} children in {} bytes", r.remaining())));
        }
        (0..n).map(|_| self.read_ref(r)).collect()
    }

    fn read_vector_leaf(&self, r: &mut Reader) -> DataResult<VectorLeaf> {
        let count = r.count(Tag::VectorLeaf)?;
        let prefix = if count > BRANCH_FACTOR as u64 {
            let prefix = self.read_ref(r)?;
            if let Some(cell) = prefix.direct_cell() {
                let expected = count - vector::tail_length(count) as u64;
                if vector::packed_count(cell) != Some(expected) {
                    return Err(DataError::non_canonical(
                        Tag::VectorLeaf.as_u8(),
                        format!("prefix is not a packed vector of {expected}"),
                    ));
                }
            }
            Some(prefix)
        } else {
            None
        };
        let items = self.read_refs(r, vector::tail_length(count))?;
        Ok(VectorLeaf {
            count,
            prefix,
            items,
        })
    }

    fn read_vector_tree(&self, r: &mut Reader) -> DataResult<VectorTree> {
        let tag = Tag::VectorTree.as_u8();
        let count = r.count(Tag::VectorTree)?;
        if count <= BRANCH_FACTOR as u64 || count % BRANCH_FACTOR as u64 != 0 {
            return Err(DataError::non_canonical(
                tag,
                format!("{count} elements cannot form a packed tree"),
            ));
        }
        let child_size = vector::child_size(count);
        let n = count.div_ceil(child_size) as usize;
        let children = self.read_refs(r, n)?;
        for (i, child) in children.iter().enumerate() {
            let expected = child_size.min(count - i as u64 * child_size);
            if let Some(cell) = child.direct_cell() {
                if vector::packed_count(cell) != Some(expected) {
                    return Err(DataError::non_canonical(
                        tag,
                        format!("child {i} is not a packed vector of {expected}"),
                    ));
                }
            }
        }
        Ok(VectorTree { count, children })
    }

    fn read_trie_leaf(&self, r: &mut Reader, tag: Tag, stride: usize) -> DataResult<TrieLeaf> {
        let n = r.count(tag)?;
        if n > BRANCH_FACTOR as u64 {
            return Err(DataError::non_canonical(
                tag.as_u8(),
                format!("leaf with {n} entries"),
            ));
        }
        let refs = self.read_refs(r, n as usize * stride)?;
        let mut prev: Option<Hash> = None;
        for key in refs.iter().step_by(stride) {
            let hash = key.hash();
            if prev.is_some_and(|p| p >= hash) {
                return Err(DataError::non_canonical(
                    tag.as_u8(),
                    "entries not in strictly ascending hash order",
                ));
            }
            prev = Some(hash);
        }
        Ok(TrieLeaf { refs })
    }

    fn read_trie_tree(&self, r: &mut Reader, tag: Tag) -> DataResult<TrieTree> {
        let count = r.count(tag)?;
        if count <= BRANCH_FACTOR as u64 {
            return Err(DataError::non_canonical(
                tag.as_u8(),
                format!("tree with only {count} entries"),
            ));
        }
        let shift = r.u8()?;
        if shift as usize >= HASH_LENGTH * 2 {
            return Err(DataError::format(format!("shift {shift} beyond hash length")));
        }
        let mask = u16::from_be_bytes(r.array::<2>()?);
        if mask == 0 {
            return Err(DataError::non_canonical(tag.as_u8(), "tree with no children"));
        }
        let children = self.read_refs(r, mask.count_ones() as usize)?;
        Ok(TrieTree {
            count,
            shift,
            mask,
            children,
        })
    }
}

fn read_big_int(r: &mut Reader) -> DataResult<BigInt> {
    let tag = Tag::BigInt.as_u8();
    let n = r.count(Tag::BigInt)?;
    if n <= 8 {
        return Err(DataError::non_canonical(tag, "integer fits in a long"));
    }
    if n > MAX_BIG_INTEGER_LENGTH as u64 {
        return Err(DataError::format(format!(
            "integer of {n} bytes exceeds {MAX_BIG_INTEGER_LENGTH}"
        )));
    }
    let bytes = r.take(n)?;
    if !integer::is_minimal(&bytes) {
        return Err(DataError::non_canonical(tag, "integer has redundant sign bytes"));
    }
    Ok(BigInt::from_minimal(bytes))
}

/// Cursor over a shared buffer with an adjustable end bound.
struct Reader {
    bytes: Bytes,
    pos: usize,
    end: usize,
}

impl Reader {
    fn new(bytes: Bytes) -> Self {
        let end = bytes.len();
        Self { bytes, pos: 0, end }
    }

    fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Running off `end` inside an embedding budget means the inline child
    /// was too large, not that the input was cut short.
    fn truncated(&self) -> DataError {
        if self.end < self.bytes.len() {
            DataError::non_canonical(Tag::Ref.as_u8(), "inline child exceeds the embedding limit")
        } else {
            DataError::format("unexpected end of input")
        }
    }

    fn peek(&self) -> DataResult<u8> {
        if self.pos < self.end {
            Ok(self.bytes[self.pos])
        } else {
            Err(self.truncated())
        }
    }

    fn u8(&mut self) -> DataResult<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn array<const N: usize>(&mut self) -> DataResult<[u8; N]> {
        let out: [u8; N] = self
            .bytes
            .get(self.pos..self.pos + N)
            .filter(|_| self.pos + N <= self.end)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| self.truncated())?;
        self.pos += N;
        Ok(out)
    }

    fn take(&mut self, len: u64) -> DataResult<Bytes> {
        if len > self.remaining() as u64 {
            return Err(self.truncated());
        }
        let start = self.pos;
        self.pos += len as usize;
        Ok(self.bytes.slice(start..self.pos))
    }

    fn vlc_error(&self, tag: Tag, e: VlcError) -> DataError {
        match e {
            VlcError::NonCanonical => DataError::non_canonical(tag.as_u8(), e.describe()),
            VlcError::Truncated => self.truncated(),
            VlcError::Overflow => DataError::format(format!("{}: {}", tag.name(), e.describe())),
        }
    }

    fn long(&mut self, tag: Tag) -> DataResult<i64> {
        let (v, n) = vlc::read_long(&self.bytes[self.pos..self.end])
            .map_err(|e| self.vlc_error(tag, e))?;
        self.pos += n;
        Ok(v)
    }

    fn count(&mut self, tag: Tag) -> DataResult<u64> {
        let (v, n) = vlc::read_count(&self.bytes[self.pos..self.end])
            .map_err(|e| self.vlc_error(tag, e))?;
        self.pos += n;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(cell: &Cell) -> String {
        hex::encode(cell.encoding())
    }

    fn decode_hex(s: &str) -> DataResult<Cell> {
        decode(hex::decode(s).unwrap())
    }

    #[test]
    fn scalar_encodings() {
        assert_eq!(hex(&Cell::nil()), "00");
        assert_eq!(hex(&Cell::bool(true)), "b1");
        assert_eq!(hex(&Cell::bool(false)), "b0");
        assert_eq!(hex(&Cell::long(0)), "1000");
        assert_eq!(hex(&Cell::long(-1)), "107f");
        assert_eq!(hex(&Cell::long(64)), "108040");
        assert_eq!(hex(&Cell::string("hi")), "30026869");
        assert_eq!(hex(&Cell::blob(vec![0xca, 0xfe])), "3102cafe");
        assert_eq!(hex(&Cell::symbol("foo").unwrap()), "3203666f6f");
        assert_eq!(hex(&Cell::keyword("k").unwrap()), "33016b");
        assert_eq!(hex(&Cell::double(1.0)), "1d3ff0000000000000");
        assert_eq!(hex(&Cell::double(f64::NAN)), "1d7ff8000000000000");
    }

    #[test]
    fn long_encoding_is_at_most_eleven_bytes() {
        assert_eq!(Cell::long(i64::MIN).encoding_length(), 11);
        assert_eq!(Cell::long(i64::MAX).encoding_length(), 11);
    }

    #[test]
    fn decode_reproduces_encoding() {
        for cell in [
            Cell::nil(),
            Cell::long(-123456789),
            Cell::from_i128(-(1 << 100)),
            Cell::string("héllo"),
            Cell::blob(vec![7u8; 1000]),
            Cell::keyword("key").unwrap(),
            Cell::double(-0.0),
        ] {
            let decoded = decode(cell.encoding().clone()).unwrap();
            assert_eq!(decoded.encoding(), cell.encoding());
            assert_eq!(decoded.hash(), cell.hash());
            assert_eq!(decoded.tag(), cell.tag());
        }
    }

    #[test]
    fn decoded_encoding_is_zero_copy() {
        let bytes = Bytes::from(hex::decode("3103010203").unwrap());
        let cell = decode(bytes.clone()).unwrap();
        assert_eq!(cell.encoding().as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn malformed_input_is_format_error() {
        for bad in ["", "ff", "10", "30056869", "3002ffff", "0000", "20", "3101"] {
            let err = decode_hex(bad).unwrap_err();
            assert!(matches!(err, DataError::Format { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn padded_long_is_non_canonical() {
        let err = decode_hex("108001").unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x10, .. }));
    }

    #[test]
    fn small_big_int_is_non_canonical() {
        // 8-byte payload fits in a long
        let err = decode_hex("19080100000000000000").unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x19, .. }));
        // redundant sign byte
        let err = decode_hex("1909000000000000000001").unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x19, .. }));
    }

    #[test]
    fn odd_nan_is_non_canonical() {
        let err = decode_hex("1d7ff0000000000001").unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x1d, .. }));
    }

    #[test]
    fn oversized_inline_child_is_non_canonical() {
        // a vector whose single element is a 150-byte blob written inline
        let mut raw = vec![0x80, 0x01, 0x31, 0x81, 0x16];
        raw.extend(std::iter::repeat(0u8).take(150));
        let err = decode(raw.clone()).unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x20, .. }), "{err}");

        // the same bytes cut short are merely truncated
        raw.truncate(100);
        assert!(decode(raw).unwrap_err().is_format());
    }

    #[test]
    fn unsorted_set_leaf_is_non_canonical() {
        let a = Cell::long(1);
        let b = Cell::long(2);
        let (lo, hi) = if a.hash() < b.hash() { (a, b) } else { (b, a) };
        let mut raw = vec![0x84, 0x02];
        raw.extend_from_slice(hi.encoding());
        raw.extend_from_slice(lo.encoding());
        let err = decode(raw.clone()).unwrap_err();
        assert!(matches!(err, DataError::NonCanonical { tag: 0x84, .. }));

        let mut sorted = vec![0x84, 0x02];
        sorted.extend_from_slice(lo.encoding());
        sorted.extend_from_slice(hi.encoding());
        assert_eq!(decode(sorted).unwrap().ref_count(), 2);
    }

    #[test]
    fn decoded_tokens_are_indirect() {
        let big = Cell::blob(vec![1u8; 200]);
        let v = crate::Vector::of([big.clone()]).into_cell();
        let decoded = decode(v.encoding().clone()).unwrap();
        let child = decoded.child_ref(0).unwrap();
        assert!(!child.is_direct());
        assert_eq!(child.hash(), big.hash());
        assert!(child.is_missing());
    }

    #[test]
    fn bare_ref_token_is_rejected() {
        let mut raw = vec![0x20];
        raw.extend_from_slice(&[0u8; 32]);
        assert!(matches!(decode(raw).unwrap_err(), DataError::Format { .. }));
    }
}
