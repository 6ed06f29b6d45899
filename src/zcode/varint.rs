//! Unsigned LEB128 varints

use super::DecodeError;

/// Append `v` as an unsigned varint
pub fn append_uvarint(dst: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        dst.push((v as u8) | 0x80);
        v >>= 7;
    }
    dst.push(v as u8);
}

/// Number of bytes `v` occupies as a varint
pub fn size_of_uvarint(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Read an unsigned varint from the front of `buf`, returning the value and
/// the number of bytes consumed
pub fn read_uvarint(buf: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut v: u64 = 0;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        if shift == 63 && b > 1 {
            return Err(DecodeError::VarintOverflow);
        }
        v |= u64::from(b & 0x7f) << shift;
        if b < 0x80 {
            return Ok((v, i + 1));
        }
        shift += 7;
        if shift > 63 {
            return Err(DecodeError::VarintOverflow);
        }
    }
    Err(DecodeError::TruncatedVarint)
}
