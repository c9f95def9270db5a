use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a directory-backed cell store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding the fan-out subdirectories.
    pub root: PathBuf,
    /// Recompute and check the hash of every record read from disk.
    pub verify_on_read: bool,
    /// Reject every write with [`StoreError::ReadOnly`](crate::StoreError::ReadOnly).
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".cellar/cells"),
            verify_on_read: true,
            read_only: false,
        }
    }
}

impl StoreConfig {
    /// Configuration rooted at the given directory, other fields default.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.root, PathBuf::from(".cellar/cells"));
        assert!(c.verify_on_read);
        assert!(!c.read_only);
    }

    #[test]
    fn at_overrides_root_only() {
        let c = StoreConfig::at("/tmp/cells");
        assert_eq!(c.root, PathBuf::from("/tmp/cells"));
        assert!(c.verify_on_read);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c: StoreConfig = serde_json::from_str(r#"{"root":"/data"}"#).unwrap();
        assert_eq!(c.root, PathBuf::from("/data"));
        assert!(c.verify_on_read);
    }
}
