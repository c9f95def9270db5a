use bytes::Bytes;
use cellar_types::{Hash, RefStatus};

use crate::error::StoreResult;
use crate::record::StoredCell;

/// Content-addressed store of cell encodings.
///
/// All implementations must satisfy these invariants:
/// - Encodings are immutable once written. The same hash always maps to the
///   same bytes.
/// - Statuses are merged monotonically: a `put` never lowers the status
///   already recorded for a hash.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait CellStore: Send + Sync {
    /// Read a cell record by hash.
    ///
    /// Returns `Ok(None)` if the hash is absent.
    fn get(&self, hash: &Hash) -> StoreResult<Option<StoredCell>>;

    /// Write an encoding under its hash with at least the given status.
    ///
    /// If the hash already exists only the status is merged. Returns the
    /// status recorded after the write.
    fn put(&self, hash: &Hash, encoding: &Bytes, status: RefStatus) -> StoreResult<RefStatus>;

    /// Check whether a hash is present.
    fn contains(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.get(hash)?.is_some())
    }

    /// Read multiple records in a batch.
    ///
    /// Default implementation calls `get()` for each hash.
    fn get_batch(&self, hashes: &[Hash]) -> StoreResult<Vec<Option<StoredCell>>> {
        hashes.iter().map(|h| self.get(h)).collect()
    }
}
