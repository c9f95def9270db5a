//! Kind tags and format constants.
//!
//! Byte 0 of every encoding is a [`Tag`]. The remaining constants fix the
//! embedding threshold and tree shape; all of them are part of the wire
//! format.

use std::fmt;

/// Maximum encoded length of a cell that is inlined into its parent.
pub const MAX_EMBEDDED_LENGTH: usize = 140;

/// Length of a hash-reference token: tag byte plus 32-byte hash.
pub const REF_ENCODING_LENGTH: usize = 33;

/// Branching factor of every collection tree.
pub const BRANCH_FACTOR: usize = 16;

/// Maximum length in bytes of a symbol or keyword name.
pub const MAX_SYMBOL_LENGTH: usize = 255;

/// Maximum length in bytes of a big integer's two's complement form.
pub const MAX_BIG_INTEGER_LENGTH: usize = 4096;

/// Kind tag of a cell encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Nil = 0x00,
    Long = 0x10,
    BigInt = 0x19,
    Double = 0x1D,
    Ref = 0x20,
    String = 0x30,
    Blob = 0x31,
    Symbol = 0x32,
    Keyword = 0x33,
    VectorLeaf = 0x80,
    VectorTree = 0x81,
    MapLeaf = 0x82,
    MapTree = 0x83,
    SetLeaf = 0x84,
    SetTree = 0x85,
    False = 0xB0,
    True = 0xB1,
}

impl Tag {
    /// Parse a tag byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Nil,
            0x10 => Self::Long,
            0x19 => Self::BigInt,
            0x1D => Self::Double,
            0x20 => Self::Ref,
            0x30 => Self::String,
            0x31 => Self::Blob,
            0x32 => Self::Symbol,
            0x33 => Self::Keyword,
            0x80 => Self::VectorLeaf,
            0x81 => Self::VectorTree,
            0x82 => Self::MapLeaf,
            0x83 => Self::MapTree,
            0x84 => Self::SetLeaf,
            0x85 => Self::SetTree,
            0xB0 => Self::False,
            0xB1 => Self::True,
            _ => return None,
        })
    }

    /// The tag byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable kind name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Long => "long",
            Self::BigInt => "bigint",
            Self::Double => "double",
            Self::Ref => "ref",
            Self::String => "string",
            Self::Blob => "blob",
            Self::Symbol => "symbol",
            Self::Keyword => "keyword",
            Self::VectorLeaf => "vector-leaf",
            Self::VectorTree => "vector-tree",
            Self::MapLeaf => "map-leaf",
            Self::MapTree => "map-tree",
            Self::SetLeaf => "set-leaf",
            Self::SetTree => "set-tree",
            Self::False | Self::True => "boolean",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bytes_roundtrip() {
        for byte in 0..=255u8 {
            if let Some(tag) = Tag::from_u8(byte) {
                assert_eq!(tag.as_u8(), byte);
            }
        }
        assert_eq!(Tag::from_u8(0x11), None);
    }

    #[test]
    fn ref_token_fits_inside_embedding_limit() {
        assert!(REF_ENCODING_LENGTH < MAX_EMBEDDED_LENGTH);
    }

    #[test]
    fn display_includes_hex() {
        assert_eq!(Tag::Long.to_string(), "long (0x10)");
    }
}
