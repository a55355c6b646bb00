//! Buffer accounting for stages.
//!
//! Every backpressure decision in the crate is computed from a
//! [`BufferQueue`]: an ordered queue of pending chunks whose total weight is
//! compared against a high-water mark.

mod queue;

pub use queue::{BufferQueue, Weigher};
