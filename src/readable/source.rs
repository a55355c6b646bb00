//! The source contract wrapped by a [`Readable`](super::Readable).

use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::BoxError;

/// Supplies chunks to a readable stage.
///
/// A source wraps a file handle, a socket or a generator. It is pulled one
/// chunk at a time: `Ok(Some(chunk))` is the next chunk, `Ok(None)` is the
/// end marker, and `Err` is a failure the stage reports as
/// [`StreamError::Source`](crate::StreamError::Source). The stage stops
/// pulling after the end marker or the first failure.
///
/// Returning `Poll::Pending` must register `cx`'s waker, exactly like
/// [`futures_io::AsyncRead`] or [`futures_core::Stream`].
pub trait Source: Send {
    /// Chunk type produced by this source.
    type Item;

    /// Pulls the next chunk.
    fn poll_pull(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Self::Item>, BoxError>>;

    /// Releases the underlying resource.
    ///
    /// Called exactly once by the owning stage, on end, error or abort.
    fn close(self: Pin<&mut Self>) {}
}

impl<S> Source for Box<S>
where
    S: Source + Unpin + ?Sized,
{
    type Item = S::Item;

    fn poll_pull(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Self::Item>, BoxError>> {
        Pin::new(&mut **self).poll_pull(cx)
    }

    fn close(mut self: Pin<&mut Self>) {
        Pin::new(&mut **self).close()
    }
}
