//! Writable stage: a buffered, backpressure-signalling front for a [`Sink`].

use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use tracing::{debug, trace, warn};

use super::Sink;
use crate::buffer::{BufferQueue, Weigher};
use crate::config::StreamConfig;
use crate::error::{AbortReason, StreamError};
use crate::signal::Signal;

/// Lifecycle of a [`Writable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritableState {
    /// Created, nothing written yet.
    Idle,
    /// Accepting writes below the high-water mark.
    Accepting,
    /// Above the high-water mark; the writer should wait for `drain`.
    Blocked,
    /// `end()` was called; flushing what is buffered.
    Finishing,
    /// Every chunk confirmed and the sink finalized. Terminal.
    Finished,
    /// The sink failed or the stage was destroyed. Terminal.
    Errored,
}

impl WritableState {
    /// Returns true for `Finished` and `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, WritableState::Finished | WritableState::Errored)
    }
}

/// A sink stage accepting chunks of type `T`.
///
/// [`write`](Self::write) buffers the chunk and answers synchronously
/// whether the caller may keep writing: `false` means the buffered weight
/// (queued plus the one chunk the sink has not confirmed yet) is above the
/// high-water mark. The stage then fires `drain` once everything that was
/// buffered has been confirmed by the sink. Writers ignoring the signal
/// still get every chunk delivered, in order; the stage counts them as
/// backpressure violations.
///
/// The sink is only driven from [`poll_drive`](Self::poll_drive), which a
/// pipeline (or the caller) polls from its task.
///
/// # Example
///
/// ```
/// use chunkflow::{CollectSink, StreamConfig, Writable};
///
/// # tokio_test::block_on(async {
/// let (sink, handle) = CollectSink::new();
/// let mut writable = Writable::new(sink, StreamConfig::new(4)?);
///
/// assert!(writable.write(b"abc".to_vec())?);
/// assert!(!writable.write(b"de".to_vec())?);
/// writable.finish().await?;
///
/// assert_eq!(handle.items(), vec![b"abc".to_vec(), b"de".to_vec()]);
/// # Ok::<(), chunkflow::StreamError>(())
/// # }).unwrap();
/// ```
pub struct Writable<T> {
    sink: Pin<Box<dyn Sink<Item = T>>>,
    queue: BufferQueue<T>,
    state: WritableState,
    in_flight: Option<usize>,
    need_drain: bool,
    ending: bool,
    released: bool,
    error: Option<StreamError>,
    waker: Option<Waker>,
    confirmed: u64,
    drains: u64,
    violations: u64,
    on_drain: Signal<()>,
    on_finish: Signal<()>,
    on_error: Signal<StreamError>,
    on_close: Signal<()>,
}

impl<T: AsRef<[u8]> + 'static> Writable<T> {
    /// Wraps a sink, weighing chunks by byte length (or 1 in object mode).
    pub fn new(sink: impl Sink<Item = T> + 'static, config: StreamConfig) -> Self {
        Self::with_weigher(sink, config, Weigher::for_config(&config))
    }
}

impl<T: 'static> Writable<T> {
    /// Wraps a sink of arbitrary values, each weighing 1.
    pub fn objects(sink: impl Sink<Item = T> + 'static, config: StreamConfig) -> Self {
        Self::with_weigher(sink, config.with_object_mode(true), Weigher::unit())
    }
}

impl<T> Writable<T> {
    /// Wraps a sink with an explicit weigher.
    pub fn with_weigher(
        sink: impl Sink<Item = T> + 'static,
        config: StreamConfig,
        weigher: Weigher<T>,
    ) -> Self {
        Self {
            sink: Box::pin(sink),
            queue: BufferQueue::new(config.high_water_mark(), weigher),
            state: WritableState::Idle,
            in_flight: None,
            need_drain: false,
            ending: false,
            released: false,
            error: None,
            waker: None,
            confirmed: 0,
            drains: 0,
            violations: 0,
            on_drain: Signal::repeating(),
            on_finish: Signal::one_shot(),
            on_error: Signal::one_shot(),
            on_close: Signal::one_shot(),
        }
    }

    /// Current state.
    pub fn state(&self) -> WritableState {
        self.state
    }

    /// Returns true while a `drain` is owed to the writer.
    pub fn needs_drain(&self) -> bool {
        self.need_drain
    }

    /// Returns true once `end()` was called.
    pub fn is_ending(&self) -> bool {
        self.ending
    }

    /// Buffered weight: queued chunks plus the unconfirmed in-flight chunk.
    pub fn buffered(&self) -> usize {
        self.queue.size() + self.in_flight.unwrap_or(0)
    }

    /// Capacity threshold.
    pub fn high_water_mark(&self) -> usize {
        self.queue.high_water_mark()
    }

    /// Chunks confirmed by the sink.
    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    /// Number of `drain` notifications fired.
    pub fn drains(&self) -> u64 {
        self.drains
    }

    /// Writes accepted while a `drain` was pending.
    pub fn violations(&self) -> u64 {
        self.violations
    }

    /// The terminal error, if the stage failed.
    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    /// Registers a listener for every `drain`.
    pub fn on_drain(&mut self, f: impl FnMut(&()) + Send + 'static) {
        self.on_drain.on(f);
    }

    /// Registers a listener for the next `drain` only.
    pub fn once_drain(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_drain.once(f);
    }

    /// Registers a listener for the single `finish` notification.
    pub fn on_finish(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_finish.once(f);
    }

    /// Registers a listener for the single `error` notification.
    pub fn on_error(&mut self, f: impl FnOnce(&StreamError) + Send + 'static) {
        self.on_error.once(f);
    }

    /// Registers a listener fired once the sink has been released.
    pub fn on_close(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_close.once(f);
    }

    pub(crate) fn weigh(&self, chunk: &T) -> usize {
        self.queue.weigh(chunk)
    }

    fn is_above_capacity(&self) -> bool {
        self.buffered() > self.queue.high_water_mark()
    }

    /// Buffers a chunk for the sink.
    ///
    /// Returns `Ok(false)` when the caller should stop writing until
    /// `drain`. Fails with [`StreamError::Closed`] after an error and with
    /// [`StreamError::Protocol`] after `end()`.
    pub fn write(&mut self, chunk: T) -> Result<bool, StreamError> {
        match self.state {
            WritableState::Errored => return Err(StreamError::Closed),
            WritableState::Finishing | WritableState::Finished => {
                return Err(StreamError::Protocol("write after end"));
            }
            _ => {}
        }
        if self.need_drain {
            self.violations += 1;
            warn!(
                buffered = self.buffered(),
                high_water_mark = self.queue.high_water_mark(),
                "write while drain pending (backpressure violation)"
            );
        }

        self.queue.enqueue(chunk)?;
        if self.state == WritableState::Idle {
            self.transition(WritableState::Accepting);
        }
        self.wake();

        let below = !self.is_above_capacity();
        if !below && !self.need_drain {
            self.need_drain = true;
            debug!(
                buffered = self.buffered(),
                high_water_mark = self.queue.high_water_mark(),
                "backpressure engaged"
            );
            self.transition(WritableState::Blocked);
        }
        Ok(below)
    }

    /// Signals that no further chunks follow, optionally writing a last one.
    ///
    /// Buffered chunks are still flushed; `finish` fires once the sink
    /// confirmed them and was finalized. Calling `end()` again is a no-op.
    pub fn end(&mut self, last: Option<T>) -> Result<(), StreamError> {
        match self.state {
            WritableState::Errored => return Err(StreamError::Closed),
            WritableState::Finishing | WritableState::Finished => {
                return match last {
                    Some(_) => Err(StreamError::Protocol("write after end")),
                    None => Ok(()),
                };
            }
            _ => {}
        }
        if let Some(chunk) = last {
            self.write(chunk)?;
        }
        self.ending = true;
        self.queue.mark_ended();
        self.transition(WritableState::Finishing);
        self.wake();
        Ok(())
    }

    /// Moves buffered chunks into the sink.
    ///
    /// Resolves `Ok` once finished, `Err` with the terminal error; otherwise
    /// `Pending` with the task registered for the next write or sink event.
    pub fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        loop {
            match self.state {
                WritableState::Finished => return Poll::Ready(Ok(())),
                WritableState::Errored => return Poll::Ready(Err(self.terminal_error())),
                _ => {}
            }

            if self.in_flight.is_some() {
                match self.sink.as_mut().poll_pushed(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(self.fail(StreamError::from_sink(e)))),
                    Poll::Ready(Ok(())) => {
                        self.in_flight = None;
                        self.confirmed += 1;
                        self.maybe_drain();
                        continue;
                    }
                }
            }

            if let Some((chunk, weight)) = self.queue.dequeue_weighted() {
                self.in_flight = Some(weight);
                if let Err(e) = self.sink.as_mut().start_push(chunk) {
                    return Poll::Ready(Err(self.fail(StreamError::from_sink(e))));
                }
                continue;
            }

            if self.ending {
                return match self.sink.as_mut().poll_finalize(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Err(e)) => Poll::Ready(Err(self.fail(StreamError::from_sink(e)))),
                    Poll::Ready(Ok(())) => {
                        self.complete();
                        Poll::Ready(Ok(()))
                    }
                };
            }

            self.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
    }

    /// Drives the sink until no `drain` is owed.
    pub fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        if !self.need_drain {
            return match &self.error {
                Some(err) => Poll::Ready(Err(err.clone())),
                None => Poll::Ready(Ok(())),
            };
        }
        match self.poll_drive(cx) {
            Poll::Ready(result) => Poll::Ready(result),
            Poll::Pending if !self.need_drain => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Writes a chunk, then waits for `drain` if backpressure engaged.
    pub async fn send(&mut self, chunk: T) -> Result<(), StreamError> {
        if !self.write(chunk)? {
            poll_fn(|cx| self.poll_ready(cx)).await?;
        }
        Ok(())
    }

    /// Ends the stage and waits for `finish`.
    pub async fn finish(&mut self) -> Result<(), StreamError> {
        self.end(None)?;
        poll_fn(|cx| self.poll_drive(cx)).await
    }

    /// Fails the stage with `err`: queued chunks are rejected, the sink is
    /// released and `error` fires once. Ignored on a terminal stage.
    pub fn destroy(&mut self, err: StreamError) {
        self.fail(err);
    }

    /// Cancels the stage with [`StreamError::Aborted`].
    pub fn abort(&mut self) {
        self.fail(StreamError::Aborted(AbortReason::Requested));
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        if self.state.is_terminal() {
            trace!(error = %err, "writable already terminal, ignoring failure");
            return self.terminal_error();
        }
        let rejected = self.queue.clear() + usize::from(self.in_flight.take().is_some());
        trace!(rejected, error = %err, "writable failed");
        self.transition(WritableState::Errored);
        self.need_drain = false;
        self.error = Some(err.clone());
        if !self.released {
            self.released = true;
            self.sink.as_mut().close();
        }
        self.on_error.emit(&err);
        self.on_close.emit(&());
        self.silence();
        self.wake();
        err
    }

    fn maybe_drain(&mut self) {
        if self.need_drain && self.buffered() == 0 && !self.ending {
            self.need_drain = false;
            self.drains += 1;
            if self.state == WritableState::Blocked {
                self.transition(WritableState::Accepting);
            }
            debug!(drains = self.drains, "drain");
            self.on_drain.emit(&());
        }
    }

    fn complete(&mut self) {
        self.released = true;
        self.need_drain = false;
        self.transition(WritableState::Finished);
        self.on_finish.emit(&());
        self.on_close.emit(&());
        self.silence();
    }

    fn silence(&mut self) {
        self.on_drain.close();
        self.on_finish.close();
        self.on_error.close();
        self.on_close.close();
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    fn terminal_error(&self) -> StreamError {
        self.error.clone().unwrap_or(StreamError::Closed)
    }

    fn transition(&mut self, to: WritableState) {
        trace!(from = ?self.state, to = ?to, "writable transition");
        self.state = to;
    }
}

impl<T> fmt::Debug for Writable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writable")
            .field("state", &self.state)
            .field("buffered", &self.buffered())
            .field("high_water_mark", &self.queue.high_water_mark())
            .field("need_drain", &self.need_drain)
            .field("confirmed", &self.confirmed)
            .finish()
    }
}
