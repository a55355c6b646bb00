//! chunkflow
//!
//! Chunked data-stream pipelines with backpressure for Rust.
//!
//! `chunkflow` moves chunks from a source to a sink through zero or more
//! conversion stages while keeping memory bounded. It is designed as a
//! small, composable primitive for:
//!
//! - file and socket copying
//! - incremental parsing and decoding
//! - fan-out of one stream to several consumers
//!
//! The crate intentionally:
//! - does NOT run an event loop (every stage is poll-based)
//! - does NOT spawn tasks or threads
//! - does NOT frame wire protocols or compress data
//! - does NOT assume a runtime (Tokio, async-std and smol all work)
//!
//! It only does one thing: **pull chunks → convert → push, never faster
//! than the slowest stage**
//!
//! # Stages
//!
//! - [`Readable`] wraps a [`Source`] and buffers up to its high-water mark.
//! - [`Writable`] wraps a [`Sink`]; `write` returns `false` once its buffer
//!   is above the mark and `drain` fires when it emptied again.
//! - [`Transform`] is writable on one side and readable on the other, with
//!   a [`Converter`] in between.
//!
//! # Pipelines
//!
//! ```
//! use chunkflow::{CollectSink, LineSplitter, Pipeline, Readable, StreamConfig, Transform, Writable};
//!
//! # tokio_test::block_on(async {
//! let source = Readable::from_items(
//!     ["first li", "ne\nsecond", " line\n"],
//!     StreamConfig::default(),
//! );
//! let (sink, lines) = CollectSink::new();
//!
//! let report = Pipeline::builder(source)
//!     .through(Transform::new(LineSplitter::new(), StreamConfig::default()))
//!     .into_sink(Writable::new(sink, StreamConfig::new(64)?))
//!     .await?;
//!
//! assert_eq!(lines.items(), ["first line", "second line"]);
//! assert_eq!(report.chunks, 2);
//! # Ok::<(), chunkflow::StreamError>(())
//! # }).unwrap();
//! ```
//!
//! Await the pipeline on any executor. It pauses the upstream stage whenever
//! a downstream `write` reports backpressure, resumes it on drain, and
//! resolves with the first error any stage reported.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod buffer;
mod chunk;
mod config;
mod duplex;
mod error;
mod hash;
mod pipeline;
mod readable;
mod signal;
mod transform;
mod writable;

#[cfg(feature = "tokio")]
pub mod timeout;

//
// Public surface
//

pub use buffer::{BufferQueue, Weigher};
pub use chunk::{Chunk, Digest};
pub use config::{
    DEFAULT_HIGH_WATER_MARK, DEFAULT_OBJECT_HIGH_WATER_MARK, Encoding, MAX_HIGH_WATER_MARK,
    StreamConfig,
};
pub use error::{AbortReason, BoxError, Result, SharedError, StreamError};
pub use signal::Signal;

pub use readable::{Flow, Readable, ReadableState, Source};
pub use transform::{
    Converter, LineSplitter, MapConverter, Output, PassThrough, TextDecoder, Transform,
    TransformState,
};
pub use writable::{Sink, Writable, WritableState};

pub use duplex::Duplex;
pub use pipeline::{
    AbortHandle, Inlet, Outlet, Pipeline, PipelineBuilder, PipelineReport, PipelineState, Tee,
};

pub use adapter::{CollectHandle, CollectSink, IterSource, StreamSource};

#[cfg(feature = "async-io")]
pub use adapter::{DEFAULT_READ_SIZE, ReaderSource, WriterSink};

#[cfg(feature = "hash-blake3")]
pub use hash::Blake3Hasher;
