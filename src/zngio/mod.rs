//! Self-describing value streams
//!
//! A stream is a sequence of messages, each introduced by one code byte:
//!
//! ```text
//! 0x00  value          uvarint local type id, tagged value
//! 0x01  typedef        kind byte, definition body
//! 0x02  end-of-stream  resets the local type table
//! ```
//!
//! Local type ids below `PRIMITIVE_COUNT` name the primitives; every
//! typedef binds the next free local id. Because end-of-stream clears the
//! table, a reader may start at any offset that follows an end-of-stream
//! marker.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

pub(crate) const MSG_VALUE: u8 = 0x00;
pub(crate) const MSG_TYPEDEF: u8 = 0x01;
pub(crate) const MSG_EOS: u8 = 0x02;

pub(crate) const KIND_RECORD: u8 = 0;
pub(crate) const KIND_ARRAY: u8 = 1;
pub(crate) const KIND_SET: u8 = 2;
pub(crate) const KIND_MAP: u8 = 3;
pub(crate) const KIND_UNION: u8 = 4;
pub(crate) const KIND_ENUM: u8 = 5;
pub(crate) const KIND_NAMED: u8 = 6;

/// Upper bound on a single message body accepted by the reader
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
