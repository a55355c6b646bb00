//! BLAKE3-based incremental digest.

use crate::chunk::Digest;

/// Incremental BLAKE3 hasher over a chunk sequence.
#[derive(Debug, Clone, Default)]
pub struct Blake3Hasher {
    state: blake3::Hasher,
    bytes: u64,
}

impl Blake3Hasher {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk of the sequence.
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
        self.bytes += data.len() as u64;
    }

    /// Returns the digest of everything fed so far.
    pub fn finalize(&self) -> Digest {
        Digest::new(self.state.finalize().into())
    }

    /// Number of bytes fed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// One-shot digest of a contiguous buffer.
    pub fn digest(data: &[u8]) -> Digest {
        Digest::new(blake3::hash(data).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        let a = Blake3Hasher::digest(b"hello world");
        assert_eq!(a, Blake3Hasher::digest(b"hello world"));
        assert_ne!(a, Blake3Hasher::digest(b"hello world!"));
    }

    #[test]
    fn test_chunking_does_not_change_digest() {
        let mut hasher = Blake3Hasher::new();
        hasher.update(b"hel");
        hasher.update(b"lo ");
        hasher.update(b"world");

        assert_eq!(hasher.finalize(), Blake3Hasher::digest(b"hello world"));
        assert_eq!(hasher.bytes(), 11);
    }
}
