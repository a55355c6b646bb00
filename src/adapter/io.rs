//! Byte sources and sinks over `futures-io`.
//!
//! Uses `futures_io::AsyncRead`/`AsyncWrite`, so any runtime works. Tokio
//! users can go through `tokio_util::compat`:
//!
//! ```ignore
//! use tokio_util::compat::TokioAsyncReadCompatExt;
//! use chunkflow::{ReaderSource, Readable, StreamConfig};
//!
//! let file = tokio::fs::File::open("data.bin").await?;
//! let readable = Readable::new(ReaderSource::new(file.compat()), StreamConfig::default());
//! ```

use std::io;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_io::{AsyncRead, AsyncWrite};
use pin_project_lite::pin_project;

use crate::chunk::Chunk;
use crate::error::BoxError;
use crate::readable::Source;
use crate::writable::Sink;

/// Default read size for [`ReaderSource`] (8 KiB).
pub const DEFAULT_READ_SIZE: usize = 8 * 1024;

pin_project! {
    /// Source reading [`Chunk`]s from an async reader.
    ///
    /// Every successful read becomes one chunk carrying its offset in the
    /// stream; a zero-length read is the end marker.
    pub struct ReaderSource<R> {
        #[pin]
        reader: R,
        buffer: Vec<u8>,
        offset: u64,
        finished: bool,
    }
}

impl<R> ReaderSource<R> {
    /// Wraps a reader with the default read size.
    pub fn new(reader: R) -> Self {
        Self::with_read_size(reader, DEFAULT_READ_SIZE)
    }

    /// Wraps a reader, reading at most `read_size` bytes per chunk.
    pub fn with_read_size(reader: R, read_size: usize) -> Self {
        Self {
            reader,
            buffer: vec![0u8; read_size.max(1)],
            offset: 0,
            finished: false,
        }
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: AsyncRead + Send> Source for ReaderSource<R> {
    type Item = Chunk;

    fn poll_pull(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Chunk>, BoxError>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(Ok(None));
        }

        match std::task::ready!(this.reader.poll_read(cx, &mut this.buffer[..])) {
            Ok(0) => {
                *this.finished = true;
                Poll::Ready(Ok(None))
            }
            Ok(n) => {
                let chunk = Chunk::with_offset(Bytes::copy_from_slice(&this.buffer[..n]), *this.offset);
                *this.offset += n as u64;
                Poll::Ready(Ok(Some(chunk)))
            }
            Err(e) => {
                *this.finished = true;
                Poll::Ready(Err(e.into()))
            }
        }
    }

    fn close(self: Pin<&mut Self>) {
        *self.project().finished = true;
    }
}

pin_project! {
    /// Sink writing byte chunks to an async writer.
    ///
    /// A push is confirmed once every byte of the chunk was accepted by the
    /// writer; finalizing flushes and closes it.
    pub struct WriterSink<W, T> {
        #[pin]
        writer: W,
        pending: Option<T>,
        written: usize,
        total: u64,
        _chunk: PhantomData<fn(T)>,
    }
}

impl<W, T> WriterSink<W, T> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pending: None,
            written: 0,
            total: 0,
            _chunk: PhantomData,
        }
    }

    /// Bytes confirmed so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W, T> Sink for WriterSink<W, T>
where
    W: AsyncWrite + Send,
    T: AsRef<[u8]> + Send,
{
    type Item = T;

    fn start_push(self: Pin<&mut Self>, chunk: T) -> Result<(), BoxError> {
        let this = self.project();
        *this.pending = Some(chunk);
        *this.written = 0;
        Ok(())
    }

    fn poll_pushed(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        let mut this = self.project();
        let Some(chunk) = this.pending.as_ref() else {
            return Poll::Ready(Ok(()));
        };
        let data = chunk.as_ref();
        while *this.written < data.len() {
            match std::task::ready!(this.writer.as_mut().poll_write(cx, &data[*this.written..])) {
                Ok(0) => {
                    return Poll::Ready(Err(io::Error::from(io::ErrorKind::WriteZero).into()));
                }
                Ok(n) => *this.written += n,
                Err(e) => return Poll::Ready(Err(e.into())),
            }
        }
        *this.total += data.len() as u64;
        *this.pending = None;
        Poll::Ready(Ok(()))
    }

    fn poll_finalize(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        let mut this = self.project();
        std::task::ready!(this.writer.as_mut().poll_flush(cx))?;
        std::task::ready!(this.writer.as_mut().poll_close(cx))?;
        Poll::Ready(Ok(()))
    }

    fn close(self: Pin<&mut Self>) {
        *self.project().pending = None;
    }
}
