//! Microindex: a sorted, multi-level index stored in one file
//!
//! File layout:
//!
//! ```text
//! base section      the input records in key order, split into frames
//! level N section   one entry per frame of level N-1 (top level first)
//! ...
//! level 1 section
//! trailer           a single record describing the sections
//! footer            u32 LE trailer length, u32 LE CRC32 of the trailer
//! ```
//!
//! Every frame is a self-contained value stream terminated by an
//! end-of-stream marker, so a reader can seek straight to any frame
//! offset. An index entry is the key record of the first value of a
//! frame extended with a child field holding that frame's offset within
//! its section.
//!
//! Index levels are built bottom-up while the base records stream in, so
//! writing needs a single pass and memory proportional to the number of
//! levels.

mod errors;
mod finder;
mod keyer;
mod reader;
mod trailer;
mod writer;

pub use errors::IndexError;
pub use finder::{Finder, Range};
pub use keyer::Keyer;
pub use reader::{Reader, Section, SectionReader};
pub use trailer::Trailer;
pub use writer::{Writer, WriterOptions};

/// Default minimum frame size in bytes
pub const FRAME_THRESH: usize = 32 * 1024;

/// Largest frame threshold accepted by the writer
pub const FRAME_MAX_SIZE: usize = 20 * 1024 * 1024;

/// Maximum number of index levels above the base
pub const MAX_LEVELS: usize = 32;

pub const MAGIC: &str = "microindex";
pub const VERSION: i64 = 2;

/// Name of the field holding a child frame offset in index entries
pub const CHILD_FIELD: &str = "_child";
