//! Configuration file
//!
//! A JSON object whose fields all have defaults, so an empty object (or
//! no file at all) is a valid configuration.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::microindex::{FRAME_MAX_SIZE, FRAME_THRESH};
use crate::value::{Nulls, Order};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Minimum microindex frame size in bytes
    #[serde(default = "default_frame_thresh")]
    pub frame_thresh: usize,

    /// Key order of new microindexes
    #[serde(default)]
    pub order: Order,

    /// Placement of nulls when sorting
    #[serde(default)]
    pub nulls: Nulls,

    /// Maximum values per batch produced by sources
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Capacity of the channels between worker threads
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Live-row limit of `until`
    #[serde(default = "default_until_limit")]
    pub until_limit: usize,
}

fn default_frame_thresh() -> usize {
    FRAME_THRESH
}
fn default_batch_size() -> usize {
    100
}
fn default_channel_capacity() -> usize {
    1
}
fn default_until_limit() -> usize {
    1_000_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_thresh: default_frame_thresh(),
            order: Order::default(),
            nulls: Nulls::default(),
            batch_size: default_batch_size(),
            channel_capacity: default_channel_capacity(),
            until_limit: default_until_limit(),
        }
    }
}

impl Config {
    /// Load and validate the configuration at `path`. A missing file
    /// yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an `Invalid` error for malformed JSON, unknown fields or
    /// out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::wrap(format!("read config {}", path.display()), e.into())),
        };
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::invalid(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_thresh == 0 || self.frame_thresh > FRAME_MAX_SIZE {
            return Err(Error::invalid(format!(
                "frame_thresh must be between 1 and {}, got {}",
                FRAME_MAX_SIZE, self.frame_thresh
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid("batch_size must be > 0"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::invalid("channel_capacity must be > 0"));
        }
        if self.until_limit == 0 {
            return Err(Error::invalid("until_limit must be > 0"));
        }
        Ok(())
    }
}
