//! Configuration for stage construction.
//!
//! - [`StreamConfig`] - High-water mark, object mode and boundary encoding
//! - [`Encoding`] - Byte-to-text decoding applied at a stream boundary
//!
//! # Example
//!
//! ```
//! use chunkflow::{Encoding, StreamConfig};
//!
//! let config = StreamConfig::new(64 * 1024)?;
//! assert_eq!(config.high_water_mark(), 64 * 1024);
//!
//! let objects = StreamConfig::default().with_object_mode(true);
//! assert_eq!(objects.high_water_mark(), 16);
//!
//! let text = StreamConfig::default().with_encoding("utf-8".parse::<Encoding>()?);
//! assert_eq!(text.encoding(), Some(Encoding::Utf8));
//! # Ok::<(), chunkflow::StreamError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// Default high-water mark for byte streams (16 KiB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Default high-water mark for object streams (16 items).
pub const DEFAULT_OBJECT_HIGH_WATER_MARK: usize = 16;

/// Largest accepted high-water mark (1 GiB).
pub const MAX_HIGH_WATER_MARK: usize = 1024 * 1024 * 1024;

/// Configuration recognized by every stage at construction.
///
/// `object_mode` changes the default weight of a chunk from its byte length
/// to a constant 1, and with it the default high-water mark. An explicit
/// high-water mark always wins.
///
/// A high-water mark of zero is legal: every non-empty write then reports
/// backpressure and readables fetch one chunk at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamConfig {
    high_water_mark: Option<usize>,
    object_mode: bool,
    encoding: Option<Encoding>,
}

impl StreamConfig {
    /// Creates a byte-stream configuration with an explicit high-water mark.
    ///
    /// Returns error if `high_water_mark` exceeds [`MAX_HIGH_WATER_MARK`].
    pub fn new(high_water_mark: usize) -> Result<Self, StreamError> {
        let config = Self::default().with_high_water_mark(high_water_mark);
        config.validate()?;
        Ok(config)
    }

    /// Creates an object-stream configuration with the default item limit.
    pub fn objects() -> Self {
        Self::default().with_object_mode(true)
    }

    /// Sets the high-water mark.
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = Some(high_water_mark);
        self
    }

    /// Enables or disables object mode.
    pub fn with_object_mode(mut self, object_mode: bool) -> Self {
        self.object_mode = object_mode;
        self
    }

    /// Sets the boundary encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Returns the effective high-water mark.
    pub fn high_water_mark(&self) -> usize {
        match (self.high_water_mark, self.object_mode) {
            (Some(hwm), _) => hwm,
            (None, true) => DEFAULT_OBJECT_HIGH_WATER_MARK,
            (None, false) => DEFAULT_HIGH_WATER_MARK,
        }
    }

    /// Returns whether object mode is enabled.
    pub fn object_mode(&self) -> bool {
        self.object_mode
    }

    /// Returns the boundary encoding, if set.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Validates the current configuration.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.high_water_mark() > MAX_HIGH_WATER_MARK {
            return Err(StreamError::InvalidConfig {
                message: "high_water_mark cannot exceed 1 GiB",
            });
        }
        Ok(())
    }
}

/// Text encoding used when decoding bytes at a stream boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// UTF-8; sequences split across chunks are reassembled.
    Utf8,
    /// ISO-8859-1, one char per byte.
    Latin1,
    /// Lowercase hexadecimal, two chars per byte.
    Hex,
}

impl FromStr for Encoding {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "binary" | "iso-8859-1" => Ok(Encoding::Latin1),
            "hex" => Ok(Encoding::Hex),
            _ => Err(StreamError::InvalidConfig {
                message: "unknown encoding",
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::Utf8 => "utf8",
            Encoding::Latin1 => "latin1",
            Encoding::Hex => "hex",
        })
    }
}
