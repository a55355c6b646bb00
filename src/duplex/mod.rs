//! Duplex stages: a readable and a writable half over one resource.
//!
//! The two halves are paced independently. Backpressure on the writable
//! half never pauses the readable half and the other way round; only
//! [`Duplex::destroy`] and [`Duplex::abort`] act on both.

use std::fmt;

use crate::error::{AbortReason, StreamError};
use crate::readable::Readable;
use crate::writable::Writable;

#[cfg(feature = "async-io")]
use crate::{
    adapter::{ReaderSource, WriterSink},
    chunk::Chunk,
    config::StreamConfig,
};

/// Independently-paced readable and writable halves.
///
/// `I` is what gets written in, `O` what is read out.
pub struct Duplex<I, O> {
    readable: Readable<O>,
    writable: Writable<I>,
}

impl<I, O> Duplex<I, O> {
    /// Pairs two halves.
    pub fn new(readable: Readable<O>, writable: Writable<I>) -> Self {
        Self { readable, writable }
    }

    /// Readable half.
    pub fn readable(&mut self) -> &mut Readable<O> {
        &mut self.readable
    }

    /// Writable half.
    pub fn writable(&mut self) -> &mut Writable<I> {
        &mut self.writable
    }

    /// Separates the halves, e.g. to drive them from different tasks or to
    /// place them in different pipelines.
    pub fn split(self) -> (Readable<O>, Writable<I>) {
        (self.readable, self.writable)
    }

    /// Fails both halves with `err`.
    ///
    /// Each half fires its own `error` once; a half that already reached a
    /// terminal state is left as it is.
    pub fn destroy(&mut self, err: StreamError) {
        self.readable.destroy(err.clone());
        self.writable.destroy(err);
    }

    /// Cancels both halves with [`StreamError::Aborted`].
    pub fn abort(&mut self) {
        self.destroy(StreamError::Aborted(AbortReason::Requested));
    }
}

#[cfg(feature = "async-io")]
impl<T> Duplex<T, Chunk>
where
    T: AsRef<[u8]> + Send + 'static,
{
    /// Splits a bidirectional byte resource (a socket, a pipe) into a
    /// [`ReaderSource`] readable half and a [`WriterSink`] writable half.
    pub fn from_io<IO>(io: IO, config: StreamConfig) -> Self
    where
        IO: futures_io::AsyncRead + futures_io::AsyncWrite + Send + 'static,
    {
        use futures_util::io::AsyncReadExt;

        let (reader, writer) = io.split();
        Self::new(
            Readable::new(ReaderSource::new(reader), config),
            Writable::new(WriterSink::new(writer), config),
        )
    }
}

impl<I, O> fmt::Debug for Duplex<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duplex")
            .field("readable", &self.readable.state())
            .field("writable", &self.writable.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CollectSink;
    use crate::config::StreamConfig;
    use crate::readable::ReadableState;
    use crate::writable::WritableState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll, Waker};

    #[test]
    fn test_halves_are_paced_independently() {
        let (sink, handle) = CollectSink::new();
        let mut duplex = Duplex::new(
            Readable::from_items([10u32, 20, 30], StreamConfig::objects()),
            Writable::objects(sink.with_latency(5), StreamConfig::new(1).unwrap()),
        );

        assert!(duplex.writable().write("ping").unwrap());
        assert!(!duplex.writable().write("pong").unwrap());
        assert!(duplex.writable().needs_drain());

        let mut cx = Context::from_waker(Waker::noop());
        let mut read = Vec::new();
        while let Poll::Ready(Ok(Some(n))) = duplex.readable().poll_read(&mut cx) {
            read.push(n);
        }
        assert_eq!(read, [10, 20, 30]);
        assert_eq!(duplex.readable().state(), ReadableState::Ended);
        assert!(duplex.writable().needs_drain());
        assert!(handle.is_empty());
    }

    #[test]
    fn test_destroy_fails_both_halves() {
        let (sink, handle) = CollectSink::<&str>::new();
        let mut duplex = Duplex::new(
            Readable::from_items(["a", "b"], StreamConfig::objects()),
            Writable::objects(sink, StreamConfig::objects()),
        );
        let errors = Arc::new(AtomicUsize::new(0));
        let (r, w) = (errors.clone(), errors.clone());
        duplex.readable().on_error(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        duplex.writable().on_error(move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        });

        duplex.abort();
        duplex.abort();

        assert_eq!(errors.load(Ordering::SeqCst), 2);
        let (readable, writable) = duplex.split();
        assert_eq!(readable.state(), ReadableState::Errored);
        assert_eq!(writable.state(), WritableState::Errored);
        assert!(readable.error().is_some_and(StreamError::is_aborted));
        assert!(handle.is_closed());
    }
}
