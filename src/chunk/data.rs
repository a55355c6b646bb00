//! The Chunk type - one immutable unit of bytes moving between stages.

use bytes::Bytes;
use std::fmt;

/// An immutable byte chunk and its position in the originating stream.
///
/// Chunks have no identity beyond their position; cloning only bumps the
/// reference count of the underlying `Bytes`. Stages are generic over the
/// chunk type, so object streams can move any value instead.
///
/// # Example
///
/// ```
/// use chunkflow::Chunk;
///
/// let chunk = Chunk::with_offset(&b"hello world"[..], 128);
///
/// assert_eq!(chunk.len(), 11);
/// assert_eq!(chunk.range(), 128..139);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk data.
    pub data: Bytes,

    /// Byte offset in the source stream (if the source tracks one).
    pub offset: Option<u64>,
}

impl Chunk {
    /// Creates a new chunk without an offset.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: None,
        }
    }

    /// Creates a new chunk with a source offset.
    pub fn with_offset(data: impl Into<Bytes>, offset: u64) -> Self {
        Self {
            data: data.into(),
            offset: Some(offset),
        }
    }

    /// Returns the length of the chunk data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the chunk has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the start offset (0 if not set).
    pub fn start(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    /// Returns the end offset (exclusive).
    pub fn end(&self) -> u64 {
        self.start() + self.data.len() as u64
    }

    /// Returns the chunk as a range in the source stream.
    pub fn range(&self) -> std::ops::Range<u64> {
        self.start()..self.end()
    }

    /// Consumes the chunk and returns the underlying data.
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Bytes> for Chunk {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&'static str> for Chunk {
    fn from(data: &'static str) -> Self {
        Self::new(Bytes::from_static(data.as_bytes()))
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk({} bytes", self.len())?;
        if let Some(offset) = self.offset {
            write!(f, " @ {}", offset)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let chunk = Chunk::new(&b"hello"[..]);
        assert_eq!(chunk.len(), 5);
        assert!(!chunk.is_empty());
        assert_eq!(chunk.offset, None);
    }

    #[test]
    fn test_empty() {
        assert!(Chunk::new(&b""[..]).is_empty());
    }

    #[test]
    fn test_range() {
        let chunk = Chunk::with_offset(&b"hello"[..], 100);
        assert_eq!(chunk.start(), 100);
        assert_eq!(chunk.end(), 105);
        assert_eq!(chunk.range(), 100..105);
    }

    #[test]
    fn test_range_without_offset() {
        let chunk = Chunk::new(&b"hello"[..]);
        assert_eq!(chunk.range(), 0..5);
    }

    #[test]
    fn test_as_ref_bytes() {
        let chunk: Chunk = "abc".into();
        assert_eq!(chunk.as_ref(), b"abc");
    }

    #[test]
    fn test_display() {
        let s = format!("{}", Chunk::with_offset(&b"hello"[..], 100));
        assert!(s.contains("5 bytes"));
        assert!(s.contains("@ 100"));
    }
}
