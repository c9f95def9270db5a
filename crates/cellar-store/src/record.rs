use bytes::Bytes;
use cellar_types::{Hash, RefStatus};

/// A stored cell: canonical encoding plus its persistence status.
///
/// `StoredCell` is the unit of storage. The store never interprets the
/// encoding; it is a pure key-value store keyed by the encoding's hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCell {
    /// The canonical encoding of the cell.
    pub encoding: Bytes,
    /// The highest status recorded for this hash.
    pub status: RefStatus,
}

impl StoredCell {
    /// Create a new record.
    pub fn new(encoding: impl Into<Bytes>, status: RefStatus) -> Self {
        Self {
            encoding: encoding.into(),
            status,
        }
    }

    /// Compute the content hash of the stored encoding.
    pub fn compute_hash(&self) -> Hash {
        Hash::compute(&self.encoding)
    }

    /// Size of the encoding in bytes.
    pub fn size(&self) -> usize {
        self.encoding.len()
    }

    /// Merge a status into this record. Returns `true` if it was upgraded.
    pub fn upgrade(&mut self, status: RefStatus) -> bool {
        if status > self.status {
            self.status = status;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_of_encoding() {
        let rec = StoredCell::new(&b"\x10\x05"[..], RefStatus::Stored);
        assert_eq!(rec.compute_hash(), Hash::compute(b"\x10\x05"));
        assert_eq!(rec.size(), 2);
    }

    #[test]
    fn upgrade_is_monotonic() {
        let mut rec = StoredCell::new(Bytes::from_static(b"\x00"), RefStatus::Persisted);
        assert!(!rec.upgrade(RefStatus::Stored));
        assert_eq!(rec.status, RefStatus::Persisted);
        assert!(rec.upgrade(RefStatus::Announced));
        assert_eq!(rec.status, RefStatus::Announced);
    }
}
