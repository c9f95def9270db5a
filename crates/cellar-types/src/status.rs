use std::fmt;

use serde::{Deserialize, Serialize};

/// Persistence status of a ref.
///
/// Statuses only ever move forward: `Unknown → Stored → Persisted →
/// Announced`. The discriminants are the on-disk byte values used by stores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RefStatus {
    /// Nothing is known about durability of the value.
    #[default]
    Unknown = 0,
    /// The value's own encoding has been written to a store.
    Stored = 1,
    /// The value and every reachable non-embedded descendant are stored.
    Persisted = 2,
    /// The value has been published beyond local storage.
    Announced = 3,
}

impl RefStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Unknown,
        Self::Stored,
        Self::Persisted,
        Self::Announced,
    ];

    /// The byte value of this status.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a status byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Returns `true` if the value's own encoding is known to be stored.
    pub fn is_stored(self) -> bool {
        self >= Self::Stored
    }

    /// Returns `true` if the whole reachable graph is known to be stored.
    pub fn is_persisted(self) -> bool {
        self >= Self::Persisted
    }
}

impl fmt::Display for RefStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Stored => write!(f, "stored"),
            Self::Persisted => write!(f, "persisted"),
            Self::Announced => write!(f, "announced"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_ordered() {
        for w in RefStatus::ALL.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert_eq!(RefStatus::default(), RefStatus::Unknown);
    }

    #[test]
    fn byte_values_roundtrip() {
        for status in RefStatus::ALL {
            assert_eq!(RefStatus::from_u8(status.as_u8()), Some(status));
        }
        assert_eq!(RefStatus::from_u8(4), None);
    }

    #[test]
    fn predicates() {
        assert!(!RefStatus::Unknown.is_stored());
        assert!(RefStatus::Stored.is_stored());
        assert!(!RefStatus::Stored.is_persisted());
        assert!(RefStatus::Announced.is_persisted());
    }

    #[test]
    fn display() {
        assert_eq!(RefStatus::Persisted.to_string(), "persisted");
        assert_eq!(RefStatus::Announced.to_string(), "announced");
    }
}
