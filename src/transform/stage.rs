//! Transform stage: a writable input queue and a readable output queue
//! joined by a [`Converter`].

use std::fmt;
use std::future::poll_fn;
use std::task::{Context, Poll, Waker};

use tracing::{debug, trace, warn};

use super::{Converter, MapConverter, Output, PassThrough};
use crate::buffer::{BufferQueue, Weigher};
use crate::config::StreamConfig;
use crate::error::{AbortReason, BoxError, StreamError};
use crate::readable::{FLOW_BUDGET, Flow};
use crate::signal::Signal;

/// Lifecycle of a [`Transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformState {
    /// Waiting for input.
    Idle,
    /// The converter holds a chunk.
    Transforming,
    /// Running the converter's flush step.
    Flushing,
    /// Flush done, output marked ended. Terminal.
    Ended,
    /// The converter failed or the stage was destroyed. Terminal.
    Errored,
}

impl TransformState {
    /// Returns true for `Ended` and `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransformState::Ended | TransformState::Errored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unset,
    Flowing,
    Pull,
}

/// A stage that is writable on its input side and readable on its output
/// side.
///
/// Input chunks are converted strictly in arrival order, one at a time. The
/// converter only receives the next input chunk while the output queue is
/// below its high-water mark, so a slow consumer backs up into the input
/// queue, and [`write`](Self::write) returns `false` once either queue is
/// above its mark. `drain` fires when the input queue is empty and the
/// output queue is back under its mark.
///
/// The output side is consumed like a [`Readable`](crate::Readable):
/// flowing through [`poll_flow`](Self::poll_flow), or pulled through
/// [`read`](Self::read) / [`poll_read`](Self::poll_read), but not both.
///
/// ```
/// use chunkflow::{StreamConfig, Transform};
///
/// let mut upper = Transform::map(StreamConfig::default(), |s: String| s.to_uppercase());
/// upper.write("ab".to_string())?;
/// upper.write("cd".to_string())?;
/// upper.end(None)?;
///
/// let mut out = Vec::new();
/// # tokio_test::block_on(async {
/// while let Some(chunk) = std::future::poll_fn(|cx| upper.poll_read(cx)).await? {
///     out.push(chunk);
/// }
/// # Ok::<(), chunkflow::StreamError>(())
/// # })?;
/// assert_eq!(out, ["AB", "CD"]);
/// # Ok::<(), chunkflow::StreamError>(())
/// ```
pub struct Transform<I, O> {
    converter: Box<dyn Converter<I, O>>,
    input: BufferQueue<I>,
    output: BufferQueue<O>,
    staged: Output<O>,
    state: TransformState,
    mode: Mode,
    paused: bool,
    busy: bool,
    need_drain: bool,
    ending: bool,
    end_delivered: bool,
    error: Option<StreamError>,
    error_reported: bool,
    waker: Option<Waker>,
    processed: u64,
    drains: u64,
    violations: u64,
    on_data: Signal<O>,
    on_drain: Signal<()>,
    on_finish: Signal<()>,
    on_end: Signal<()>,
    on_error: Signal<StreamError>,
    on_close: Signal<()>,
}

impl<I, O> Transform<I, O>
where
    I: AsRef<[u8]> + 'static,
    O: AsRef<[u8]> + 'static,
{
    /// Creates a byte transform; both queues weigh chunks by byte length
    /// (or 1 in object mode).
    pub fn new(converter: impl Converter<I, O> + 'static, config: StreamConfig) -> Self {
        Self::with_weighers(
            converter,
            config,
            Weigher::for_config(&config),
            Weigher::for_config(&config),
        )
    }

    /// Applies `f` to every chunk.
    pub fn map<F>(config: StreamConfig, mut f: F) -> Self
    where
        F: FnMut(I) -> O + Send + 'static,
    {
        Self::new(
            MapConverter::new(move |chunk: I| -> Result<O, BoxError> { Ok(f(chunk)) }),
            config,
        )
    }

    /// Applies a fallible `f` to every chunk; the first error fails the stage.
    pub fn try_map<F, E>(config: StreamConfig, mut f: F) -> Self
    where
        F: FnMut(I) -> Result<O, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::new(
            MapConverter::new(move |chunk: I| -> Result<O, BoxError> { f(chunk).map_err(Into::into) }),
            config,
        )
    }
}

impl<T: AsRef<[u8]> + Send + 'static> Transform<T, T> {
    /// Forwards chunks unchanged.
    pub fn pass_through(config: StreamConfig) -> Self {
        Self::new(PassThrough::new(), config)
    }
}

impl<I: 'static, O: 'static> Transform<I, O> {
    /// Creates an object transform; every chunk weighs 1 on both sides.
    pub fn objects(converter: impl Converter<I, O> + 'static, config: StreamConfig) -> Self {
        Self::with_weighers(
            converter,
            config.with_object_mode(true),
            Weigher::unit(),
            Weigher::unit(),
        )
    }
}

impl<I, O> Transform<I, O> {
    /// Creates a transform with explicit weighers for each side.
    pub fn with_weighers(
        converter: impl Converter<I, O> + 'static,
        config: StreamConfig,
        input: Weigher<I>,
        output: Weigher<O>,
    ) -> Self {
        let hwm = config.high_water_mark();
        Self {
            converter: Box::new(converter),
            input: BufferQueue::new(hwm, input),
            output: BufferQueue::new(hwm, output),
            staged: Output::new(),
            state: TransformState::Idle,
            mode: Mode::Unset,
            paused: false,
            busy: false,
            need_drain: false,
            ending: false,
            end_delivered: false,
            error: None,
            error_reported: false,
            waker: None,
            processed: 0,
            drains: 0,
            violations: 0,
            on_data: Signal::repeating(),
            on_drain: Signal::repeating(),
            on_finish: Signal::one_shot(),
            on_end: Signal::one_shot(),
            on_error: Signal::one_shot(),
            on_close: Signal::one_shot(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TransformState {
        self.state
    }

    /// Returns true while the output side is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns true while a `drain` is owed to the writer.
    pub fn needs_drain(&self) -> bool {
        self.need_drain
    }

    /// Returns true once the input side was ended.
    pub fn is_ending(&self) -> bool {
        self.ending
    }

    /// Weight waiting on the input side.
    pub fn buffered_input(&self) -> usize {
        self.input.size()
    }

    /// Weight waiting on the output side.
    pub fn buffered_output(&self) -> usize {
        self.output.size()
    }

    /// Input chunks fully converted.
    pub fn processed(&self) -> u64 {
        self.processed
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

    /// Registers a listener for every output chunk delivered in flowing mode.
    pub fn on_data(&mut self, f: impl FnMut(&O) + Send + 'static) {
        self.on_data.on(f);
    }

    /// Registers a listener for every `drain`.
    pub fn on_drain(&mut self, f: impl FnMut(&()) + Send + 'static) {
        self.on_drain.on(f);
    }

    /// Registers a listener fired once the flush step completed.
    pub fn on_finish(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_finish.once(f);
    }

    /// Registers a listener fired once the last output chunk was consumed.
    pub fn on_end(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_end.once(f);
    }

    /// Registers a listener for the single `error` notification.
    pub fn on_error(&mut self, f: impl FnOnce(&StreamError) + Send + 'static) {
        self.on_error.once(f);
    }

    /// Registers a listener fired when the stage shuts down.
    pub fn on_close(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_close.once(f);
    }

    pub(crate) fn weigh_input(&self, chunk: &I) -> usize {
        self.input.weigh(chunk)
    }

    fn is_blocked(&self) -> bool {
        self.input.is_above_capacity() || self.output.is_above_capacity()
    }

    /// Buffers an input chunk.
    ///
    /// Returns `Ok(false)` when either side is above its high-water mark.
    pub fn write(&mut self, chunk: I) -> Result<bool, StreamError> {
        if self.state == TransformState::Errored {
            return Err(StreamError::Closed);
        }
        if self.ending {
            return Err(StreamError::Protocol("write after end"));
        }
        if self.need_drain {
            self.violations += 1;
            warn!(
                buffered = self.input.size(),
                high_water_mark = self.input.high_water_mark(),
                "transform write while drain pending (backpressure violation)"
            );
        }

        self.input.enqueue(chunk)?;
        self.wake();

        let accepting = !self.is_blocked();
        if !accepting && !self.need_drain {
            self.need_drain = true;
            debug!(
                input = self.input.size(),
                output = self.output.size(),
                "transform backpressure engaged"
            );
        }
        Ok(accepting)
    }

    /// Ends the input side, optionally writing a last chunk. The flush step
    /// runs once every input chunk was converted. Calling it again is a no-op.
    pub fn end(&mut self, last: Option<I>) -> Result<(), StreamError> {
        if self.state == TransformState::Errored {
            return Err(StreamError::Closed);
        }
        if self.ending {
            return match last {
                Some(_) => Err(StreamError::Protocol("write after end")),
                None => Ok(()),
            };
        }
        if let Some(chunk) = last {
            self.write(chunk)?;
        }
        self.ending = true;
        self.input.mark_ended();
        self.wake();
        Ok(())
    }

    /// Restarts a paused flowing session.
    pub fn resume(&mut self) -> Result<(), StreamError> {
        if self.mode == Mode::Pull {
            return Err(StreamError::Protocol("resume() on a transform in pull mode"));
        }
        self.mode = Mode::Flowing;
        if self.paused {
            self.paused = false;
            trace!("transform output resumed");
            self.wake();
        }
        Ok(())
    }

    /// Halts delivery on the output side.
    pub fn pause(&mut self) -> Result<(), StreamError> {
        if self.mode == Mode::Pull {
            return Err(StreamError::Protocol("pause() on a transform in pull mode"));
        }
        self.mode = Mode::Flowing;
        if !self.paused {
            self.paused = true;
            trace!("transform output paused");
        }
        Ok(())
    }

    /// Drives conversion and hands every output chunk to `deliver`.
    ///
    /// Resolves `Ok` once the last output chunk was delivered after flush,
    /// `Err` with the terminal error.
    pub fn poll_flow(
        &mut self,
        cx: &mut Context<'_>,
        deliver: &mut dyn FnMut(O) -> Flow,
    ) -> Poll<Result<(), StreamError>> {
        if self.mode == Mode::Pull {
            return Poll::Ready(Err(StreamError::Protocol(
                "flowing consumption of a transform in pull mode",
            )));
        }
        self.mode = Mode::Flowing;

        let mut budget = FLOW_BUDGET;
        loop {
            if self.state == TransformState::Errored {
                return Poll::Ready(Err(self.terminal_error()));
            }
            if self.paused {
                self.waker = Some(cx.waker().clone());
                return Poll::Pending;
            }

            if let Some(chunk) = self.output.dequeue() {
                self.on_data.emit(&chunk);
                if deliver(chunk) == Flow::Pause {
                    self.paused = true;
                }
                self.maybe_drain();
                budget -= 1;
                if budget == 0 {
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                continue;
            }

            if self.output.is_ended() {
                self.deliver_end();
                return Poll::Ready(Ok(()));
            }

            if !self.process(cx)? {
                self.waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
        }
    }

    /// Returns the next converted chunk without waiting.
    ///
    /// Converts buffered input synchronously where the converter allows it;
    /// a converter waiting on asynchronous work makes this return `None`.
    pub fn read(&mut self) -> Result<Option<O>, StreamError> {
        self.enter_pull()?;
        let mut cx = Context::from_waker(Waker::noop());
        let next = self.next_output(&mut cx);
        if next.is_err() {
            self.error_reported = true;
        }
        next
    }

    /// Pull-mode read that waits for conversion.
    ///
    /// A stage destroyed from outside reports its error once; later reads
    /// fail with [`StreamError::Protocol`].
    pub fn poll_read(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<O>, StreamError>> {
        let unreported = self.state == TransformState::Errored && !self.error_reported;
        if unreported && self.mode != Mode::Flowing {
            self.mode = Mode::Pull;
            self.error_reported = true;
            return Poll::Ready(Err(self.terminal_error()));
        }
        self.enter_pull()?;
        let next = self.next_output(cx);
        if next.is_err() {
            self.error_reported = true;
        }
        match next? {
            Some(chunk) => Poll::Ready(Ok(Some(chunk))),
            None if self.end_delivered => Poll::Ready(Ok(None)),
            None => {
                self.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// Async wrapper around [`poll_flow`](Self::poll_flow).
    pub async fn flow(&mut self, mut deliver: impl FnMut(O) -> Flow) -> Result<(), StreamError> {
        poll_fn(|cx| self.poll_flow(cx, &mut deliver)).await
    }

    /// Fails the stage with `err`: both queues are discarded and `error`
    /// fires once. Ignored on an errored stage. A stage that already ended
    /// stays `Ended`; unread output is dropped and only `close` fires.
    pub fn destroy(&mut self, err: StreamError) {
        self.fail(err);
    }

    /// Cancels the stage with [`StreamError::Aborted`].
    pub fn abort(&mut self) {
        self.fail(StreamError::Aborted(AbortReason::Requested));
    }

    fn enter_pull(&mut self) -> Result<(), StreamError> {
        match self.mode {
            Mode::Flowing => return Err(StreamError::Protocol("read() on a transform in flowing mode")),
            Mode::Unset => self.mode = Mode::Pull,
            Mode::Pull => {}
        }
        if self.state == TransformState::Errored {
            return Err(StreamError::Protocol("read() after error"));
        }
        Ok(())
    }

    fn next_output(&mut self, cx: &mut Context<'_>) -> Result<Option<O>, StreamError> {
        loop {
            if let Some(chunk) = self.output.dequeue() {
                self.maybe_drain();
                return Ok(Some(chunk));
            }
            if self.output.is_ended() {
                self.deliver_end();
                return Ok(None);
            }
            if !self.process(cx)? {
                return Ok(None);
            }
        }
    }

    /// Feeds input to the converter while the output side has room.
    ///
    /// Returns whether anything changed.
    fn process(&mut self, cx: &mut Context<'_>) -> Result<bool, StreamError> {
        let mut progressed = false;
        loop {
            if self.state.is_terminal() {
                return Ok(progressed);
            }

            if self.busy {
                match self.converter.poll_complete(cx, &mut self.staged) {
                    Poll::Pending => return Ok(self.stage_output()? || progressed),
                    Poll::Ready(Err(e)) => return Err(self.fail(StreamError::from_transform(e))),
                    Poll::Ready(Ok(())) => {
                        self.busy = false;
                        self.processed += 1;
                        self.stage_output()?;
                        self.transition(TransformState::Idle);
                        self.maybe_drain();
                        progressed = true;
                    }
                }
                continue;
            }

            if !self.output.is_empty() && !self.output.is_below_mark() {
                return Ok(progressed);
            }

            if let Some(chunk) = self.input.dequeue() {
                self.transition(TransformState::Transforming);
                if let Err(e) = self.converter.transform(chunk, &mut self.staged) {
                    return Err(self.fail(StreamError::from_transform(e)));
                }
                self.busy = true;
                progressed = true;
                continue;
            }

            if self.ending {
                self.transition(TransformState::Flushing);
                if let Err(e) = self.converter.flush(&mut self.staged) {
                    return Err(self.fail(StreamError::from_transform(e)));
                }
                self.stage_output()?;
                self.output.mark_ended();
                self.transition(TransformState::Ended);
                self.need_drain = false;
                trace!(processed = self.processed, "transform flushed");
                self.on_finish.emit(&());
                return Ok(true);
            }

            self.maybe_drain();
            return Ok(progressed);
        }
    }

    fn stage_output(&mut self) -> Result<bool, StreamError> {
        if self.staged.is_empty() {
            return Ok(false);
        }
        for chunk in self.staged.drain() {
            self.output.enqueue(chunk)?;
        }
        Ok(true)
    }

    fn maybe_drain(&mut self) {
        if self.need_drain
            && !self.ending
            && !self.busy
            && self.input.is_empty()
            && !self.output.is_above_capacity()
        {
            self.need_drain = false;
            self.drains += 1;
            debug!(drains = self.drains, "transform drain");
            self.on_drain.emit(&());
        }
    }

    fn deliver_end(&mut self) {
        if self.end_delivered {
            return;
        }
        self.end_delivered = true;
        self.on_end.emit(&());
        self.on_close.emit(&());
        self.silence();
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        match self.state {
            TransformState::Errored => {
                trace!(error = %err, "transform already errored, ignoring failure");
                return self.terminal_error();
            }
            TransformState::Ended => {
                // `finish` already fired: drop unread output, close quietly.
                let discarded = self.output.clear();
                trace!(discarded, error = %err, "transform already ended, discarding output");
                if !self.end_delivered {
                    self.end_delivered = true;
                    self.on_close.emit(&());
                }
                self.need_drain = false;
                self.silence();
                self.wake();
                return err;
            }
            _ => {}
        }
        let discarded = self.input.clear() + self.output.clear() + self.staged.len();
        self.staged.clear();
        trace!(discarded, error = %err, "transform failed");
        self.transition(TransformState::Errored);
        self.busy = false;
        self.need_drain = false;
        self.error = Some(err.clone());
        if !self.end_delivered {
            self.on_error.emit(&err);
            self.on_close.emit(&());
        }
        self.silence();
        self.wake();
        err
    }

    fn silence(&mut self) {
        self.on_data.close();
        self.on_drain.close();
        self.on_finish.close();
        self.on_end.close();
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

    fn transition(&mut self, to: TransformState) {
        if self.state != to {
            trace!(from = ?self.state, to = ?to, "transform transition");
            self.state = to;
        }
    }
}

impl<I, O> fmt::Debug for Transform<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("state", &self.state)
            .field("input", &self.input.size())
            .field("output", &self.output.size())
            .field("paused", &self.paused)
            .field("processed", &self.processed)
            .finish()
    }
}
