use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use cellar_types::{Hash, RefStatus};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::record::StoredCell;
use crate::traits::CellStore;

/// In-memory, HashMap-based cell store.
///
/// Intended for tests and embedding. All records are held behind a `RwLock`
/// for safe concurrent access. Encodings are reference-counted `Bytes`, so
/// reads never copy.
pub struct MemoryStore {
    cells: RwLock<HashMap<Hash, StoredCell>>,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.cells.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.read().expect("lock poisoned").is_empty()
    }

    /// Number of `put` calls that inserted a new encoding.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total bytes across all stored encodings.
    pub fn total_bytes(&self) -> u64 {
        self.cells
            .read()
            .expect("lock poisoned")
            .values()
            .map(|rec| rec.size() as u64)
            .sum()
    }

    /// Remove all records from the store.
    pub fn clear(&self) {
        self.cells.write().expect("lock poisoned").clear();
    }

    /// Return a sorted list of all hashes in the store.
    pub fn all_hashes(&self) -> Vec<Hash> {
        let map = self.cells.read().expect("lock poisoned");
        let mut hashes: Vec<Hash> = map.keys().copied().collect();
        hashes.sort();
        hashes
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CellStore for MemoryStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<StoredCell>> {
        let map = self.cells.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    fn put(&self, hash: &Hash, encoding: &Bytes, status: RefStatus) -> StoreResult<RefStatus> {
        let computed = Hash::compute(encoding);
        if computed != *hash {
            return Err(StoreError::HashMismatch {
                expected: *hash,
                computed,
            });
        }
        let mut map = self.cells.write().expect("lock poisoned");
        match map.get_mut(hash) {
            Some(existing) => {
                existing.upgrade(status);
                Ok(existing.status)
            }
            None => {
                trace!(hash = %hash.short_hex(), %status, len = encoding.len(), "stored cell");
                map.insert(*hash, StoredCell::new(encoding.clone(), status));
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(status)
            }
        }
    }

    fn contains(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.cells.read().expect("lock poisoned");
        Ok(map.contains_key(hash))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("cell_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &MemoryStore, data: &'static [u8], status: RefStatus) -> Hash {
        let hash = Hash::compute(data);
        store
            .put(&hash, &Bytes::from_static(data), status)
            .unwrap();
        hash
    }

    #[test]
    fn put_and_get() {
        let store = MemoryStore::new();
        let hash = put(&store, b"\x31\x03abc", RefStatus::Stored);
        let rec = store.get(&hash).unwrap().expect("should exist");
        assert_eq!(&rec.encoding[..], b"\x31\x03abc");
        assert_eq!(rec.status, RefStatus::Stored);
        assert_eq!(rec.compute_hash(), hash);
    }

    #[test]
    fn missing_hash_returns_none() {
        let store = MemoryStore::new();
        assert!(store.get(&Hash::compute(b"missing")).unwrap().is_none());
        assert!(!store.contains(&Hash::compute(b"missing")).unwrap());
    }

    #[test]
    fn put_rejects_wrong_hash() {
        let store = MemoryStore::new();
        let err = store
            .put(&Hash::ZERO, &Bytes::from_static(b"data"), RefStatus::Stored)
            .unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemoryStore::new();
        let h1 = put(&store, b"same", RefStatus::Stored);
        let h2 = put(&store, b"same", RefStatus::Stored);
        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn status_never_moves_backward() {
        let store = MemoryStore::new();
        let hash = put(&store, b"value", RefStatus::Persisted);
        let after = store
            .put(&hash, &Bytes::from_static(b"value"), RefStatus::Stored)
            .unwrap();
        assert_eq!(after, RefStatus::Persisted);
        let after = store
            .put(&hash, &Bytes::from_static(b"value"), RefStatus::Announced)
            .unwrap();
        assert_eq!(after, RefStatus::Announced);
        assert_eq!(store.get(&hash).unwrap().unwrap().status, RefStatus::Announced);
    }

    #[test]
    fn batch_get_with_missing() {
        let store = MemoryStore::new();
        let present = put(&store, b"exists", RefStatus::Stored);
        let results = store
            .get_batch(&[present, Hash::compute(b"absent")])
            .unwrap();
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[test]
    fn utility_methods() {
        let store = MemoryStore::default();
        assert!(store.is_empty());
        put(&store, b"12345", RefStatus::Stored);
        put(&store, b"123456789", RefStatus::Stored);
        assert_eq!(store.total_bytes(), 14);
        let hashes = store.all_hashes();
        assert!(hashes[0] <= hashes[1]);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let hash = put(&store, b"shared data", RefStatus::Stored);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let rec = store.get(&hash).unwrap().expect("present");
                    assert_eq!(rec.compute_hash(), hash);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = MemoryStore::new();
        put(&store, b"x", RefStatus::Stored);
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryStore"));
        assert!(debug.contains("cell_count"));
    }
}
