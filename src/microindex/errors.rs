//! Microindex error types

use thiserror::Error as ThisError;

use crate::error::{Error, ErrorKind};

#[derive(Debug, ThisError)]
pub enum IndexError {
    /// Consecutive input keys violate the declared order
    #[error("keys out of order: {next} follows {prev}")]
    BadOrder { prev: String, next: String },

    /// A key field changed type mid-stream
    #[error("key field \"{field}\" changed type from {was} to {now}")]
    KeyTypeDrift { field: String, was: String, now: String },

    #[error("frame threshold {0} outside 1..={max}", max = super::FRAME_MAX_SIZE)]
    FrameThresh(usize),

    #[error("microindex exceeds {} levels", super::MAX_LEVELS)]
    TooManyLevels,

    #[error("not a microindex")]
    NotIndex,

    #[error("microindex version {found} found while expecting version {want}", want = super::VERSION)]
    BadVersion { found: i64 },

    #[error("microindex trailer checksum mismatch")]
    Checksum,

    #[error("corrupt microindex: {0}")]
    Corrupt(String),
}

impl From<IndexError> for Error {
    fn from(e: IndexError) -> Self {
        let kind = match e {
            IndexError::TooManyLevels => ErrorKind::Other,
            _ => ErrorKind::Invalid,
        };
        Error::from_cause(kind, e)
    }
}
