//! The conversion step of a [`Transform`](super::Transform).

use std::fmt;
use std::marker::PhantomData;
use std::task::{Context, Poll};

use crate::error::BoxError;

/// Collects the chunks a converter emits for one input chunk (or flush).
///
/// Emitted chunks keep the order in which they were pushed.
pub struct Output<O> {
    items: Vec<O>,
}

impl<O> Output<O> {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Emits one output chunk.
    pub fn push(&mut self, chunk: O) {
        self.items.push(chunk);
    }

    /// Number of chunks emitted and not yet taken by the stage.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, O> {
        self.items.drain(..)
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

impl<O> fmt::Debug for Output<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").field("pending", &self.items.len()).finish()
    }
}

/// Converts input chunks of type `I` into output chunks of type `O`.
///
/// [`transform`](Converter::transform) is called once per input chunk, in
/// arrival order, and may push zero, one or many chunks. A converter with
/// asynchronous work returns from `transform` and completes in
/// [`poll_complete`](Converter::poll_complete); the stage hands it no other
/// chunk until that resolves. [`flush`](Converter::flush) runs exactly once
/// after the last input chunk.
///
/// Errors are reported as [`StreamError::Transform`](crate::StreamError::Transform).
pub trait Converter<I, O>: Send {
    /// Converts one input chunk.
    fn transform(&mut self, chunk: I, out: &mut Output<O>) -> Result<(), BoxError>;

    /// Finishes work started by the last `transform` call.
    fn poll_complete(
        &mut self,
        _cx: &mut Context<'_>,
        _out: &mut Output<O>,
    ) -> Poll<Result<(), BoxError>> {
        Poll::Ready(Ok(()))
    }

    /// Emits residual state after the input ended.
    fn flush(&mut self, _out: &mut Output<O>) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Forwards every chunk unchanged.
pub struct PassThrough<T> {
    _chunk: PhantomData<fn(T) -> T>,
}

impl<T> PassThrough<T> {
    /// Creates the converter.
    pub fn new() -> Self {
        Self {
            _chunk: PhantomData,
        }
    }
}

impl<T> Default for PassThrough<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PassThrough<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PassThrough")
    }
}

impl<T> Converter<T, T> for PassThrough<T> {
    fn transform(&mut self, chunk: T, out: &mut Output<T>) -> Result<(), BoxError> {
        out.push(chunk);
        Ok(())
    }
}

/// Applies a fallible function to every chunk, one output per input.
pub struct MapConverter<F> {
    f: F,
}

impl<F> MapConverter<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for MapConverter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MapConverter")
    }
}

impl<I, O, F> Converter<I, O> for MapConverter<F>
where
    F: FnMut(I) -> Result<O, BoxError> + Send,
{
    fn transform(&mut self, chunk: I, out: &mut Output<O>) -> Result<(), BoxError> {
        out.push((self.f)(chunk)?);
        Ok(())
    }
}
