//! Error types for chunkflow.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error surfaced by source and sink adapters.
///
/// Adapters never decide whether a failure is a source or a sink fault; the
/// stage that owns the adapter classifies it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared, cloneable form of an adapter failure.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Why a stage or pipeline was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// `abort()` was called explicitly (directly or through an `AbortHandle`).
    Requested,
    /// No forward progress was observed within the watchdog interval.
    Stalled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Requested => f.write_str("requested"),
            AbortReason::Stalled => f.write_str("stalled"),
        }
    }
}

/// Errors that can occur while moving chunks through stages.
///
/// Every stage reports at most one terminal error, and the same value is
/// handed to listeners and returned to the pipeline caller, hence `Clone`.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The underlying source failed (I/O fault, remote reset).
    #[error("source error: {0}")]
    Source(SharedError),

    /// The underlying sink failed.
    #[error("sink error: {0}")]
    Sink(SharedError),

    /// A transform's converter failed.
    #[error("transform error: {0}")]
    Transform(SharedError),

    /// The caller misused the API.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// A buffer was mutated in a state that forbids it.
    #[error("state error: {0}")]
    State(&'static str),

    /// The stage was already errored or destroyed.
    #[error("stream is closed")]
    Closed,

    /// Cancellation was requested.
    #[error("aborted ({0})")]
    Aborted(AbortReason),

    /// Invalid configuration parameter.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// Description of what was invalid.
        message: &'static str,
    },
}

impl StreamError {
    /// Wraps an adapter failure as a source error.
    pub fn from_source(err: impl Into<BoxError>) -> Self {
        StreamError::Source(Arc::from(err.into()))
    }

    /// Wraps an adapter failure as a sink error.
    pub fn from_sink(err: impl Into<BoxError>) -> Self {
        StreamError::Sink(Arc::from(err.into()))
    }

    /// Wraps a converter failure as a transform error.
    pub fn from_transform(err: impl Into<BoxError>) -> Self {
        StreamError::Transform(Arc::from(err.into()))
    }

    /// Returns true for deliberate cancellation rather than a fault.
    pub fn is_aborted(&self) -> bool {
        matches!(self, StreamError::Aborted(_))
    }

    /// Returns true for API misuse.
    pub fn is_protocol(&self) -> bool {
        matches!(self, StreamError::Protocol(_))
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::from_source(e)
    }
}
