use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of a [`Hash`] in bytes.
pub const HASH_LENGTH: usize = 32;

/// Content digest of a cell's canonical encoding.
///
/// A `Hash` is the BLAKE3 digest of an encoding. Equal encodings always
/// produce the same `Hash`, which makes it the sole key for indirect storage
/// and the identity used when deduplicating ref graphs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// The all-zero hash. Never the digest of a real encoding in practice.
    pub const ZERO: Self = Self([0u8; HASH_LENGTH]);

    /// Compute the hash of an encoding.
    pub fn compute(encoding: &[u8]) -> Self {
        Self(*blake3::hash(encoding).as_bytes())
    }

    /// Wrap a pre-computed digest.
    pub const fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Read a hash from the first 32 bytes of a slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_LENGTH] = bytes
            .get(..HASH_LENGTH)
            .and_then(|b| b.try_into().ok())
            .ok_or(TypeError::InvalidLength {
                expected: HASH_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns `true` if this is [`Hash::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Hex digit (nibble) at position `digit`, counting from the most
    /// significant nibble of the first byte. Used for trie bucketing.
    pub fn digit(&self, digit: usize) -> usize {
        let byte = self.0[digit / 2];
        if digit % 2 == 0 {
            (byte >> 4) as usize
        } else {
            (byte & 0x0f) as usize
        }
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != HASH_LENGTH {
            return Err(TypeError::InvalidLength {
                expected: HASH_LENGTH,
                actual: bytes.len(),
            });
        }
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; HASH_LENGTH]> for Hash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_LENGTH] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}
