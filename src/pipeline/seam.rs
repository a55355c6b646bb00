//! The two seams a pipeline connects: the readable side of one stage
//! ([`Outlet`]) and the writable side of the next ([`Inlet`]).

use std::task::{Context, Poll};

use crate::error::StreamError;
use crate::readable::{Flow, Readable};
use crate::transform::Transform;
use crate::writable::Writable;

/// Readable side of a stage, driven in flowing mode.
pub trait Outlet<T> {
    /// Hands chunks to `deliver` until it answers [`Flow::Pause`], the
    /// stage has nothing more right now (`Pending`), or the stage ended
    /// (`Ready(Ok)`).
    fn poll_flow(
        &mut self,
        cx: &mut Context<'_>,
        deliver: &mut dyn FnMut(T) -> Flow,
    ) -> Poll<Result<(), StreamError>>;

    /// Restarts delivery after a pause.
    fn resume(&mut self) -> Result<(), StreamError>;

    /// Tears the stage down with `err`.
    fn destroy(&mut self, err: StreamError);
}

/// Writable side of a stage.
pub trait Inlet<T> {
    /// Accepts a chunk; `Ok(false)` asks the writer to wait for drain.
    fn write(&mut self, chunk: T) -> Result<bool, StreamError>;

    /// No more chunks follow.
    fn end(&mut self) -> Result<(), StreamError>;

    /// Returns true while the writer should hold back.
    fn needs_drain(&self) -> bool;

    /// Moves buffered chunks along. `Ready(Ok)` once everything after
    /// `end()` has been flushed.
    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>>;

    /// Tears the stage down with `err`, discarding what it buffers.
    fn destroy(&mut self, err: StreamError);

    /// Weight of `chunk` by this stage's accounting.
    fn weigh(&self, chunk: &T) -> usize;
}

impl<T> Outlet<T> for Readable<T> {
    fn poll_flow(
        &mut self,
        cx: &mut Context<'_>,
        deliver: &mut dyn FnMut(T) -> Flow,
    ) -> Poll<Result<(), StreamError>> {
        Readable::poll_flow(self, cx, deliver)
    }

    fn resume(&mut self) -> Result<(), StreamError> {
        Readable::resume(self)
    }

    fn destroy(&mut self, err: StreamError) {
        Readable::destroy(self, err);
    }
}

impl<I, O> Outlet<O> for Transform<I, O> {
    fn poll_flow(
        &mut self,
        cx: &mut Context<'_>,
        deliver: &mut dyn FnMut(O) -> Flow,
    ) -> Poll<Result<(), StreamError>> {
        Transform::poll_flow(self, cx, deliver)
    }

    fn resume(&mut self) -> Result<(), StreamError> {
        Transform::resume(self)
    }

    fn destroy(&mut self, err: StreamError) {
        Transform::destroy(self, err);
    }
}

impl<T> Inlet<T> for Writable<T> {
    fn write(&mut self, chunk: T) -> Result<bool, StreamError> {
        Writable::write(self, chunk)
    }

    fn end(&mut self) -> Result<(), StreamError> {
        Writable::end(self, None)
    }

    fn needs_drain(&self) -> bool {
        Writable::needs_drain(self)
    }

    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        Writable::poll_drive(self, cx)
    }

    fn destroy(&mut self, err: StreamError) {
        Writable::destroy(self, err);
    }

    fn weigh(&self, chunk: &T) -> usize {
        Writable::weigh(self, chunk)
    }
}

impl<T, S: Inlet<T> + ?Sized> Inlet<T> for Box<S> {
    fn write(&mut self, chunk: T) -> Result<bool, StreamError> {
        (**self).write(chunk)
    }

    fn end(&mut self) -> Result<(), StreamError> {
        (**self).end()
    }

    fn needs_drain(&self) -> bool {
        (**self).needs_drain()
    }

    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        (**self).poll_drive(cx)
    }

    fn destroy(&mut self, err: StreamError) {
        (**self).destroy(err);
    }

    fn weigh(&self, chunk: &T) -> usize {
        (**self).weigh(chunk)
    }
}
