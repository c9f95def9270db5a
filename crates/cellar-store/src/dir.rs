use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use cellar_types::{Hash, RefStatus};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::record::StoredCell;
use crate::traits::CellStore;

/// Directory-backed cell store.
///
/// Each record lives in its own file named by the hex hash, fanned out by the
/// first byte of the hash:
///
/// ```text
/// <root>/ab/abcdef0123...  = [1 byte: status][N bytes: encoding]
/// ```
///
/// Writes go through a temporary file in the same directory followed by an
/// atomic rename, so readers never observe a torn record.
pub struct DirStore {
    config: StoreConfig,
    write_lock: Mutex<()>,
}

impl DirStore {
    /// Open (or create) a store rooted at `config.root`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        if !config.read_only {
            fs::create_dir_all(&config.root)?;
        }
        debug!(root = %config.root.display(), read_only = config.read_only, "opened directory store");
        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Open a store at a path with default settings.
    pub fn open_at(root: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(StoreConfig::at(root.as_ref()))
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn record_path(&self, hash: &Hash) -> PathBuf {
        let hex = hash.to_hex();
        self.config.root.join(&hex[..2]).join(hex)
    }

    fn read_record(&self, hash: &Hash) -> StoreResult<Option<StoredCell>> {
        let raw = match fs::read(self.record_path(hash)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (&status_byte, encoding) = raw.split_first().ok_or_else(|| StoreError::Corrupt {
            hash: *hash,
            reason: "empty record".into(),
        })?;
        let status = RefStatus::from_u8(status_byte).ok_or_else(|| StoreError::Corrupt {
            hash: *hash,
            reason: format!("bad status byte {status_byte:#04x}"),
        })?;
        let record = StoredCell::new(Bytes::copy_from_slice(encoding), status);
        if self.config.verify_on_read {
            let computed = record.compute_hash();
            if computed != *hash {
                warn!(hash = %hash.short_hex(), "record failed hash verification");
                return Err(StoreError::HashMismatch {
                    expected: *hash,
                    computed,
                });
            }
        }
        Ok(Some(record))
    }

    fn write_record(&self, hash: &Hash, record: &StoredCell) -> StoreResult<()> {
        let path = self.record_path(hash);
        let dir = path.parent().unwrap_or(&self.config.root);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&[record.status.as_u8()])?;
        tmp.write_all(&record.encoding)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl CellStore for DirStore {
    fn get(&self, hash: &Hash) -> StoreResult<Option<StoredCell>> {
        self.read_record(hash)
    }

    fn put(&self, hash: &Hash, encoding: &Bytes, status: RefStatus) -> StoreResult<RefStatus> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        let computed = Hash::compute(encoding);
        if computed != *hash {
            return Err(StoreError::HashMismatch {
                expected: *hash,
                computed,
            });
        }
        let _guard = self.write_lock.lock().expect("lock poisoned");
        match self.read_record(hash)? {
            Some(mut existing) => {
                if existing.upgrade(status) {
                    self.write_record(hash, &existing)?;
                }
                Ok(existing.status)
            }
            None => {
                self.write_record(hash, &StoredCell::new(encoding.clone(), status))?;
                debug!(hash = %hash.short_hex(), %status, len = encoding.len(), "wrote cell record");
                Ok(status)
            }
        }
    }

    fn contains(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.record_path(hash).is_file())
    }
}

impl std::fmt::Debug for DirStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirStore")
            .field("root", &self.config.root)
            .finish()
    }
}
