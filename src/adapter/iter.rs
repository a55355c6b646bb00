//! In-memory sources.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::error::BoxError;
use crate::readable::Source;

pin_project! {
    /// Source over an iterator; every pull is immediately ready.
    #[derive(Debug)]
    pub struct IterSource<I> {
        iter: I,
        closed: bool,
    }
}

impl<I: Iterator> IterSource<I> {
    /// Creates a source from anything iterable.
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
            closed: false,
        }
    }
}

impl<I> Source for IterSource<I>
where
    I: Iterator + Send,
{
    type Item = I::Item;

    fn poll_pull(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Self::Item>, BoxError>> {
        let this = self.project();
        if *this.closed {
            return Poll::Ready(Ok(None));
        }
        Poll::Ready(Ok(this.iter.next()))
    }

    fn close(self: Pin<&mut Self>) {
        *self.project().closed = true;
    }
}

pin_project! {
    /// Source over any fallible [`Stream`].
    ///
    /// Each `Ok` item becomes a chunk, the first `Err` fails the readable,
    /// and the end of the stream is the end marker.
    #[derive(Debug)]
    pub struct StreamSource<S> {
        #[pin]
        stream: S,
        closed: bool,
    }
}

impl<S> StreamSource<S> {
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

impl<S, T, E> Source for StreamSource<S>
where
    S: Stream<Item = Result<T, E>> + Send,
    E: Into<BoxError>,
{
    type Item = T;

    fn poll_pull(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<Option<T>, BoxError>> {
        let this = self.project();
        if *this.closed {
            return Poll::Ready(Ok(None));
        }
        match std::task::ready!(this.stream.poll_next(cx)) {
            Some(Ok(chunk)) => Poll::Ready(Ok(Some(chunk))),
            Some(Err(e)) => Poll::Ready(Err(e.into())),
            None => Poll::Ready(Ok(None)),
        }
    }

    fn close(self: Pin<&mut Self>) {
        *self.project().closed = true;
    }
}
