//! Chunk types.
//!
//! - [`Chunk`] - Immutable byte chunk with its position in the source stream
//! - [`Digest`] - 32-byte content digest of a delivered byte sequence

mod data;
mod digest;

pub use data::Chunk;
pub use digest::Digest;
