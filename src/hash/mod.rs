//! Digest computation for delivered data.
//!
//! Pipelines can fingerprint the exact byte sequence handed to their
//! terminal stage, which makes the no-loss property checkable end to end.
//! Currently supports BLAKE3 via the `hash-blake3` feature.
//!
//! - [`Blake3Hasher`] - incremental BLAKE3 hasher (requires `hash-blake3` feature)

#[cfg(feature = "hash-blake3")]
mod blake3;

#[cfg(feature = "hash-blake3")]
pub use blake3::Blake3Hasher;
