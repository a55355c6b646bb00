//! Writable side of a stream.
//!
//! - [`Sink`] - Contract for the resource a writable wraps
//! - [`Writable`] - Buffered sink stage with backpressure and `drain`
//! - [`WritableState`] - Lifecycle

mod sink;
mod stage;

pub use sink::Sink;
pub use stage::{Writable, WritableState};
