//! Tagged-length byte encoding for values
//!
//! Every value is prefixed by an unsigned varint tag:
//!
//! ```text
//! tag = 0            primitive null, no body
//! tag = 1            container null, no body
//! tag even, >= 2     primitive, body length (tag/2) - 1
//! tag odd,  >= 3     container, body length ((tag-1)/2) - 1
//! ```
//!
//! A container body is the concatenation of tagged sub-values, so the same
//! encoding nests to any depth. The encoding is used both in memory (as the
//! byte representation of `Value`) and on disk.

mod builder;
mod iter;
mod varint;

pub use builder::Builder;
pub use iter::{Iter, Slot};
pub use varint::{append_uvarint, read_uvarint, size_of_uvarint};

/// Errors raised while decoding tagged bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated varint")]
    TruncatedVarint,
    #[error("varint overflows 64 bits")]
    VarintOverflow,
    #[error("truncated value: need {need} bytes, have {have}")]
    TruncatedBody { need: usize, have: usize },
    #[error("unexpected end of container")]
    UnexpectedEnd,
}

impl From<DecodeError> for crate::error::Error {
    fn from(e: DecodeError) -> Self {
        crate::error::Error::from_cause(crate::error::ErrorKind::Invalid, e)
    }
}

/// Tag for a non-null primitive body of `len` bytes
pub fn primitive_tag(len: usize) -> u64 {
    ((len as u64) + 1) << 1
}

/// Tag for a non-null container body of `len` bytes
pub fn container_tag(len: usize) -> u64 {
    (((len as u64) + 1) << 1) | 1
}

/// Append a tagged primitive; `None` encodes null
pub fn append_primitive(dst: &mut Vec<u8>, body: Option<&[u8]>) {
    match body {
        None => dst.push(0),
        Some(b) => {
            append_uvarint(dst, primitive_tag(b.len()));
            dst.extend_from_slice(b);
        }
    }
}

/// Append a tagged container whose body is already encoded; `None` encodes null
pub fn append_container(dst: &mut Vec<u8>, body: Option<&[u8]>) {
    match body {
        None => dst.push(1),
        Some(b) => {
            append_uvarint(dst, container_tag(b.len()));
            dst.extend_from_slice(b);
        }
    }
}

/// Append a value as either a primitive or a container
pub fn append(dst: &mut Vec<u8>, body: Option<&[u8]>, container: bool) {
    if container {
        append_container(dst, body)
    } else {
        append_primitive(dst, body)
    }
}

/// Decode a single tagged value at the start of `buf`, returning the slot and
/// the number of bytes consumed.
pub fn decode_tagged(buf: &[u8]) -> Result<(Slot<'_>, usize), DecodeError> {
    let (tag, n) = read_uvarint(buf)?;
    let container = tag & 1 == 1;
    if tag <= 1 {
        return Ok((Slot { body: None, container }, n));
    }
    let len = ((tag >> 1) - 1) as usize;
    let end = n
        .checked_add(len)
        .ok_or(DecodeError::TruncatedBody { need: usize::MAX, have: buf.len() })?;
    if end > buf.len() {
        return Err(DecodeError::TruncatedBody {
            need: end,
            have: buf.len(),
        });
    }
    Ok((
        Slot {
            body: Some(&buf[n..end]),
            container,
        },
        end,
    ))
}
