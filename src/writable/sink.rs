//! The sink contract wrapped by a [`Writable`](super::Writable).

use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::BoxError;

/// Accepts chunks from a writable stage.
///
/// Pushing is two-phase: [`start_push`](Sink::start_push) hands a chunk
/// over, [`poll_pushed`](Sink::poll_pushed) resolves once the sink confirmed
/// it. The owning stage never starts a push while another is unconfirmed,
/// so a sink only ever tracks one in-flight chunk.
///
/// Failures from any method are reported as
/// [`StreamError::Sink`](crate::StreamError::Sink).
pub trait Sink: Send {
    /// Chunk type accepted by this sink.
    type Item;

    /// Hands one chunk to the sink.
    fn start_push(self: Pin<&mut Self>, chunk: Self::Item) -> Result<(), BoxError>;

    /// Resolves once the last started push is confirmed.
    fn poll_pushed(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>>;

    /// Flushes and closes the sink after the last chunk.
    fn poll_finalize(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>>;

    /// Releases the underlying resource without flushing.
    ///
    /// Called at most once, on error or abort.
    fn close(self: Pin<&mut Self>) {}
}
