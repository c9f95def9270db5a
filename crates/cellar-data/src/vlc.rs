//! Variable-length integer codings.
//!
//! Both codings write big-endian groups of 7 bits. Every byte except the last
//! has the continuation bit `0x80` set. The signed coding ([`write_long`])
//! additionally treats bit `0x40` of the first byte as the sign, so small
//! negative numbers stay short. The unsigned coding ([`write_count`]) is used
//! for lengths and element counts.
//!
//! A coding is canonical only at its minimal length; readers report longer
//! forms as [`VlcError::NonCanonical`].

use bytes::BufMut;

/// Maximum bytes in a VLC signed long.
pub const MAX_VLC_LONG_LENGTH: usize = 10;

/// Maximum bytes in a VLC count.
pub const MAX_VLC_COUNT_LENGTH: usize = 10;

/// Failure reading a variable-length integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlcError {
    /// Input ended inside the integer.
    Truncated,
    /// The value does not fit in 64 bits.
    Overflow,
    /// A shorter coding of the same value exists.
    NonCanonical,
}

impl VlcError {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::Truncated => "truncated variable-length integer",
            Self::Overflow => "variable-length integer overflows 64 bits",
            Self::NonCanonical => "variable-length integer is not minimal",
        }
    }
}

/// Encoded length of `value` as a VLC signed long.
pub fn long_length(value: i64) -> usize {
    // magnitude bits plus one sign bit
    let bits = 65 - (value ^ (value >> 63)).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Encoded length of `value` as a VLC count.
pub fn count_length(value: u64) -> usize {
    let bits = (64 - value.leading_zeros() as usize).max(1);
    bits.div_ceil(7)
}

/// Append `value` as a VLC signed long.
pub fn write_long(buf: &mut impl BufMut, value: i64) {
    let n = long_length(value);
    for i in (1..n).rev() {
        buf.put_u8(0x80 | ((value >> (7 * i)) & 0x7f) as u8);
    }
    buf.put_u8((value & 0x7f) as u8);
}

/// Append `value` as a VLC count.
pub fn write_count(buf: &mut impl BufMut, value: u64) {
    let n = count_length(value);
    for i in (1..n).rev() {
        buf.put_u8(0x80 | ((value >> (7 * i)) & 0x7f) as u8);
    }
    buf.put_u8((value & 0x7f) as u8);
}

/// Read a VLC signed long, returning the value and the bytes consumed.
pub fn read_long(data: &[u8]) -> Result<(i64, usize), VlcError> {
    let first = *data.first().ok_or(VlcError::Truncated)?;
    // sign-extend the low 7 bits
    let mut value = (((first & 0x7f) << 1) as i8 >> 1) as i64;
    let mut byte = first;
    let mut len = 1;
    while byte & 0x80 != 0 {
        if len >= MAX_VLC_LONG_LENGTH {
            return Err(VlcError::Overflow);
        }
        byte = *data.get(len).ok_or(VlcError::Truncated)?;
        let shifted = value << 7;
        if shifted >> 7 != value {
            return Err(VlcError::Overflow);
        }
        value = shifted | (byte & 0x7f) as i64;
        len += 1;
    }
    if len != long_length(value) {
        return Err(VlcError::NonCanonical);
    }
    Ok((value, len))
}

/// Read a VLC count, returning the value and the bytes consumed.
pub fn read_count(data: &[u8]) -> Result<(u64, usize), VlcError> {
    let first = *data.first().ok_or(VlcError::Truncated)?;
    if first == 0x80 {
        return Err(VlcError::NonCanonical);
    }
    let mut value = (first & 0x7f) as u64;
    let mut byte = first;
    let mut len = 1;
    while byte & 0x80 != 0 {
        if len >= MAX_VLC_COUNT_LENGTH {
            return Err(VlcError::Overflow);
        }
        byte = *data.get(len).ok_or(VlcError::Truncated)?;
        if value >> 57 != 0 {
            return Err(VlcError::Overflow);
        }
        value = (value << 7) | (byte & 0x7f) as u64;
        len += 1;
    }
    Ok((value, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn long_bytes(value: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_long(&mut buf, value);
        buf
    }

    fn count_bytes(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_count(&mut buf, value);
        buf
    }

    #[test]
    fn small_longs_take_one_byte() {
        assert_eq!(long_bytes(0), vec![0x00]);
        assert_eq!(long_bytes(1), vec![0x01]);
        assert_eq!(long_bytes(63), vec![0x3f]);
        assert_eq!(long_bytes(-1), vec![0x7f]);
        assert_eq!(long_bytes(-64), vec![0x40]);
    }

    #[test]
    fn sign_bit_forces_second_byte() {
        assert_eq!(long_bytes(64), vec![0x80, 0x40]);
        assert_eq!(long_bytes(-65), vec![0xff, 0x3f]);
    }

    #[test]
    fn extreme_longs_take_ten_bytes() {
        assert_eq!(long_length(i64::MAX), MAX_VLC_LONG_LENGTH);
        assert_eq!(long_length(i64::MIN), MAX_VLC_LONG_LENGTH);
        assert_eq!(read_long(&long_bytes(i64::MIN)).unwrap(), (i64::MIN, 10));
        assert_eq!(read_long(&long_bytes(i64::MAX)).unwrap(), (i64::MAX, 10));
    }

    #[test]
    fn padded_long_is_non_canonical() {
        // 1 written with a redundant leading group
        assert_eq!(read_long(&[0x80, 0x01]), Err(VlcError::NonCanonical));
        // -1 written with a redundant leading group
        assert_eq!(read_long(&[0xff, 0x7f]), Err(VlcError::NonCanonical));
    }

    #[test]
    fn overlong_long_overflows() {
        let mut data = vec![0x81; 10];
        data.push(0x00);
        assert_eq!(read_long(&data), Err(VlcError::Overflow));
    }

    #[test]
    fn truncated_input() {
        assert_eq!(read_long(&[]), Err(VlcError::Truncated));
        assert_eq!(read_long(&[0x80]), Err(VlcError::Truncated));
        assert_eq!(read_count(&[0x81]), Err(VlcError::Truncated));
    }

    #[test]
    fn counts() {
        assert_eq!(count_bytes(0), vec![0x00]);
        assert_eq!(count_bytes(127), vec![0x7f]);
        assert_eq!(count_bytes(128), vec![0x81, 0x00]);
        assert_eq!(count_length(u64::MAX), MAX_VLC_COUNT_LENGTH);
        assert_eq!(read_count(&[0x80, 0x05]), Err(VlcError::NonCanonical));
    }

    #[test]
    fn reader_ignores_trailing_bytes() {
        assert_eq!(read_long(&[0x05, 0xaa, 0xbb]).unwrap(), (5, 1));
        assert_eq!(read_count(&[0x81, 0x00, 0xff]).unwrap(), (128, 2));
    }

    proptest! {
        #[test]
        fn long_roundtrip(value in any::<i64>()) {
            let bytes = long_bytes(value);
            prop_assert_eq!(bytes.len(), long_length(value));
            prop_assert_eq!(read_long(&bytes).unwrap(), (value, bytes.len()));
        }

        #[test]
        fn count_roundtrip(value in any::<u64>()) {
            let bytes = count_bytes(value);
            prop_assert_eq!(bytes.len(), count_length(value));
            prop_assert_eq!(read_count(&bytes).unwrap(), (value, bytes.len()));
        }
    }
}
