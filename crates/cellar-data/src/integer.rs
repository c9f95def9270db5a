//! Integers too large for a 64-bit long.

use std::fmt;

use bytes::Bytes;

/// An integer outside the `i64` range, stored as minimal big-endian two's
/// complement bytes.
///
/// Values that fit in an `i64` are always represented as longs, so a
/// `BigInt` always has more than 8 bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BigInt {
    bytes: Bytes,
}

impl BigInt {
    /// Wrap bytes that are already minimal and longer than 8 bytes.
    pub(crate) fn from_minimal(bytes: Bytes) -> Self {
        debug_assert!(bytes.len() > 8 && is_minimal(&bytes));
        Self { bytes }
    }

    /// Minimal big-endian two's complement bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the two's complement form.
    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_negative(&self) -> bool {
        self.bytes.first().is_some_and(|b| b & 0x80 != 0)
    }

    /// Lower bound on the length of [`BigInt::to_decimal`], sign excluded.
    ///
    /// A minimal value of `n` bytes has a magnitude of at least
    /// `2^(8(n-1)-1)`, and `0.3 < log10(2)`.
    pub fn min_decimal_digits(&self) -> usize {
        let bits = (8 * self.bytes.len()).saturating_sub(9);
        bits * 3 / 10 + 1
    }

    /// Decimal representation.
    pub fn to_decimal(&self) -> String {
        let mut magnitude = self.bytes.to_vec();
        let negative = self.is_negative();
        if negative {
            negate(&mut magnitude);
        }
        let mut groups = Vec::new();
        strip_zeros(&mut magnitude);
        while !magnitude.is_empty() {
            let mut rem = 0u64;
            for b in magnitude.iter_mut() {
                let cur = rem * 256 + *b as u64;
                *b = (cur / 1_000_000_000) as u8;
                rem = cur % 1_000_000_000;
            }
            groups.push(rem);
            strip_zeros(&mut magnitude);
        }
        let mut out = String::new();
        if negative {
            out.push('-');
        }
        match groups.split_last() {
            Some((head, rest)) => {
                out.push_str(&head.to_string());
                for g in rest.iter().rev() {
                    out.push_str(&format!("{g:09}"));
                }
            }
            None => out.push('0'),
        }
        out
    }
}

impl fmt::Debug for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigInt({})", self.to_decimal())
    }
}

/// Returns `true` if no leading byte of `bytes` is a redundant sign byte.
pub(crate) fn is_minimal(bytes: &[u8]) -> bool {
    match bytes {
        [] => false,
        [0x00, next, ..] => next & 0x80 != 0,
        [0xff, next, ..] => next & 0x80 == 0,
        _ => true,
    }
}

/// Strip redundant sign bytes from a two's complement number.
pub(crate) fn minimize(bytes: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < bytes.len() && !is_minimal(&bytes[start..]) {
        start += 1;
    }
    if bytes.is_empty() {
        &[0]
    } else {
        &bytes[start..]
    }
}

fn negate(bytes: &mut [u8]) {
    let mut carry = true;
    for b in bytes.iter_mut().rev() {
        let (v, c) = (!*b).overflowing_add(carry as u8);
        *b = v;
        carry = c;
    }
}

fn strip_zeros(bytes: &mut Vec<u8>) {
    let zeros = bytes.iter().take_while(|&&b| b == 0).count();
    bytes.drain(..zeros);
}
