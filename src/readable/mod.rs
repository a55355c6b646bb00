//! Readable side of a stream.
//!
//! - [`Source`] - Contract for the resource a readable wraps
//! - [`Readable`] - Buffered source stage with flowing and pull consumption
//! - [`ReadableState`] / [`Flow`] - Lifecycle and consumer answers

mod source;
mod stage;

pub use source::Source;
pub use stage::{Flow, Readable, ReadableState};

pub(crate) use stage::FLOW_BUDGET;
