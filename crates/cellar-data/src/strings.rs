use std::fmt;

use bytes::Bytes;

use crate::error::{DataError, DataResult};

/// UTF-8 text held in shared bytes.
///
/// A string produced by [`CvmString::slice`] is a zero-copy view into its
/// parent's buffer. Such a view is not canonical: it encodes exactly like an
/// owned copy, but [`CvmString::to_canonical`] must be used before holding
/// on to it so the parent buffer can be released.
#[derive(Clone)]
pub struct CvmString {
    bytes: Bytes,
    canonical: bool,
}

impl CvmString {
    pub fn new(text: &str) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(text.as_bytes()),
            canonical: true,
        }
    }

    /// Wrap bytes after checking they are UTF-8.
    pub(crate) fn from_utf8(bytes: Bytes) -> DataResult<Self> {
        std::str::from_utf8(&bytes).map_err(|e| DataError::format(format!("invalid UTF-8: {e}")))?;
        Ok(Self {
            bytes,
            canonical: true,
        })
    }

    pub fn as_str(&self) -> &str {
        // validated on construction
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Zero-copy view of the byte range `start..end`.
    ///
    /// Returns `None` unless both offsets fall on character boundaries.
    pub fn slice(&self, start: usize, end: usize) -> Option<Self> {
        let text = self.as_str();
        if start > end || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return None;
        }
        if start == 0 && end == self.len() {
            return Some(self.clone());
        }
        Some(Self {
            bytes: self.bytes.slice(start..end),
            canonical: false,
        })
    }

    /// An owned copy that no longer shares its parent's buffer.
    pub fn to_canonical(&self) -> Self {
        if self.canonical {
            return self.clone();
        }
        Self {
            bytes: Bytes::copy_from_slice(&self.bytes),
            canonical: true,
        }
    }
}

impl PartialEq for CvmString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for CvmString {}

impl fmt::Debug for CvmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}
