//! Ready-made sources and sinks.
//!
//! - [`IterSource`] / [`StreamSource`] - In-memory and `Stream`-backed sources
//! - [`CollectSink`] - In-memory sink with an inspection handle
//! - [`ReaderSource`] / [`WriterSink`] - `futures-io` byte adapters (requires `async-io` feature)

mod collect;
mod iter;

#[cfg(feature = "async-io")]
mod io;

pub use collect::{CollectHandle, CollectSink};
pub use iter::{IterSource, StreamSource};

#[cfg(feature = "async-io")]
pub use io::{DEFAULT_READ_SIZE, ReaderSource, WriterSink};
