//! Body encodings of primitive values
//!
//! Integers use the shortest little-endian form: an int64 is zig-zag mapped
//! first so small negative numbers stay short. Zero encodes as an empty body.

use crate::error::{Error, Result};

pub fn encode_uint(v: u64) -> Vec<u8> {
    let n = 8 - (v.leading_zeros() as usize) / 8;
    v.to_le_bytes()[..n].to_vec()
}

pub fn decode_uint(b: &[u8]) -> Result<u64> {
    if b.len() > 8 {
        return Err(Error::invalid(format!(
            "uint64 body too long: {} bytes",
            b.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf[..b.len()].copy_from_slice(b);
    Ok(u64::from_le_bytes(buf))
}

pub fn encode_int(v: i64) -> Vec<u8> {
    encode_uint(((v << 1) ^ (v >> 63)) as u64)
}

pub fn decode_int(b: &[u8]) -> Result<i64> {
    let u = decode_uint(b)?;
    Ok(((u >> 1) as i64) ^ -((u & 1) as i64))
}

pub fn encode_float(v: f64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn decode_float(b: &[u8]) -> Result<f64> {
    let arr: [u8; 8] = b
        .try_into()
        .map_err(|_| Error::invalid(format!("float64 body must be 8 bytes, got {}", b.len())))?;
    Ok(f64::from_le_bytes(arr))
}

pub fn encode_bool(v: bool) -> Vec<u8> {
    vec![v as u8]
}

pub fn decode_bool(b: &[u8]) -> Result<bool> {
    match b {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(Error::invalid("malformed bool body")),
    }
}

pub fn decode_string(b: &[u8]) -> Result<&str> {
    std::str::from_utf8(b).map_err(|e| Error::invalid(format!("malformed string: {}", e)))
}
