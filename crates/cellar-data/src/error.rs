use cellar_store::StoreError;
use cellar_types::Hash;

/// Errors from encoding, decoding, ref resolution and validation.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Malformed bytes: truncation, unknown tag, invalid UTF-8, trailing data.
    #[error("bad format: {reason}")]
    Format { reason: String },

    /// Well-formed bytes that are not the canonical encoding of their value.
    #[error("non-canonical encoding (tag {tag:#04x}): {reason}")]
    NonCanonical { tag: u8, reason: String },

    /// An indirect ref was dereferenced but its value is not available.
    #[error("missing data: {0}")]
    MissingData(Hash),

    /// A cell violates a structural invariant found by an explicit validation pass.
    #[error("invalid data: {0}")]
    Validation(String),

    /// Positional access outside of a collection's bounds.
    #[error("index {index} out of bounds for count {count}")]
    IndexOutOfBounds { index: u64, count: u64 },

    /// Failure in the underlying cell store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DataError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
        }
    }

    pub(crate) fn non_canonical(tag: u8, reason: impl Into<String>) -> Self {
        Self::NonCanonical {
            tag,
            reason: reason.into(),
        }
    }

    /// Returns `true` if more data needs to be fetched to proceed.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingData(_))
    }

    /// Returns `true` if the bytes themselves are corrupt or non-canonical.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. } | Self::NonCanonical { .. })
    }
}

/// Result alias for data operations.
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_format_are_distinguishable() {
        let missing = DataError::MissingData(Hash::ZERO);
        assert!(missing.is_missing());
        assert!(!missing.is_format());

        let bad = DataError::format("truncated");
        assert!(bad.is_format());
        assert!(!bad.is_missing());

        let nc = DataError::non_canonical(0x10, "oversized");
        assert!(nc.is_format());
        assert!(nc.to_string().contains("0x10"));
    }

    #[test]
    fn store_errors_convert() {
        let err: DataError = StoreError::ReadOnly.into();
        assert!(matches!(err, DataError::Store(StoreError::ReadOnly)));
        assert!(!err.is_missing());
    }
}
