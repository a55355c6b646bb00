//! Readable stage: a buffered, pausable view over a [`Source`].

use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use futures_core::Stream;
use tracing::trace;

use super::Source;
use crate::adapter::IterSource;
use crate::buffer::{BufferQueue, Weigher};
use crate::config::StreamConfig;
use crate::error::{AbortReason, StreamError};
use crate::signal::Signal;

/// Chunks delivered per `poll_flow` call before yielding to the scheduler.
pub(crate) const FLOW_BUDGET: usize = 64;

/// Lifecycle of a [`Readable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadableState {
    /// Created, no consumer yet.
    Idle,
    /// Pushing chunks to the consumer as they arrive.
    Flowing,
    /// Flowing session halted; the source is not pulled.
    Paused,
    /// Source exhausted and every chunk consumed.
    Ended,
    /// Source failed or the stage was destroyed. Terminal.
    Errored,
}

impl ReadableState {
    /// Returns true for `Ended` and `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReadableState::Ended | ReadableState::Errored)
    }
}

/// Answer of a flowing-mode consumer after receiving a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep delivering.
    Continue,
    /// Pause the readable; a later `resume()` restarts delivery.
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unset,
    Flowing,
    Pull,
}

/// A source stage producing chunks of type `T`.
///
/// Two consumption protocols are supported, and the first one used fixes
/// the session:
///
/// - **flowing**: [`resume`](Self::resume) then [`poll_flow`](Self::poll_flow)
///   (or [`flow`](Self::flow)); every chunk is handed to the consumer and to
///   `data` listeners as soon as it is pulled.
/// - **pull**: [`read`](Self::read) returns a buffered chunk or `None`;
///   [`poll_fill`](Self::poll_fill) pulls from the source and emits
///   `readable` when something can be read. `Readable` also implements
///   [`Stream`] in this mode.
///
/// Mixing them fails with [`StreamError::Protocol`].
///
/// The source is only pulled while the buffered weight is below the
/// high-water mark (or the buffer is empty), which caps memory regardless
/// of consumer speed.
///
/// # Example
///
/// ```
/// use chunkflow::{Flow, Readable, StreamConfig};
///
/// # tokio_test::block_on(async {
/// let mut readable = Readable::from_items(["a", "b", "c"], StreamConfig::objects());
/// let mut seen = Vec::new();
/// readable.resume()?;
/// readable
///     .flow(|chunk| {
///         seen.push(chunk);
///         Flow::Continue
///     })
///     .await?;
/// assert_eq!(seen, ["a", "b", "c"]);
/// # Ok::<(), chunkflow::StreamError>(())
/// # }).unwrap();
/// ```
pub struct Readable<T> {
    source: Pin<Box<dyn Source<Item = T>>>,
    queue: BufferQueue<T>,
    state: ReadableState,
    mode: Mode,
    released: bool,
    error: Option<StreamError>,
    error_reported: bool,
    waker: Option<Waker>,
    pulls: u64,
    on_data: Signal<T>,
    on_readable: Signal<()>,
    on_end: Signal<()>,
    on_error: Signal<StreamError>,
    on_close: Signal<()>,
}

impl<T: AsRef<[u8]> + 'static> Readable<T> {
    /// Wraps a source, weighing chunks by byte length (or 1 in object mode).
    pub fn new(source: impl Source<Item = T> + 'static, config: StreamConfig) -> Self {
        Self::with_weigher(source, config, Weigher::for_config(&config))
    }
}

impl<T: 'static> Readable<T> {
    /// Wraps a source of arbitrary values, each weighing 1.
    pub fn objects(source: impl Source<Item = T> + 'static, config: StreamConfig) -> Self {
        Self::with_weigher(source, config.with_object_mode(true), Weigher::unit())
    }

    /// Readable over an in-memory sequence, each item weighing 1.
    pub fn from_items<I>(iter: I, config: StreamConfig) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::objects(IterSource::new(iter), config)
    }
}

impl<T> Readable<T> {
    /// Wraps a source with an explicit weigher.
    pub fn with_weigher(
        source: impl Source<Item = T> + 'static,
        config: StreamConfig,
        weigher: Weigher<T>,
    ) -> Self {
        Self {
            source: Box::pin(source),
            queue: BufferQueue::new(config.high_water_mark(), weigher),
            state: ReadableState::Idle,
            mode: Mode::Unset,
            released: false,
            error: None,
            error_reported: false,
            waker: None,
            pulls: 0,
            on_data: Signal::repeating(),
            on_readable: Signal::repeating(),
            on_end: Signal::one_shot(),
            on_error: Signal::one_shot(),
            on_close: Signal::one_shot(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ReadableState {
        self.state
    }

    /// Returns true while a flowing session is paused.
    pub fn is_paused(&self) -> bool {
        self.state == ReadableState::Paused
    }

    /// Weight currently buffered.
    pub fn buffered(&self) -> usize {
        self.queue.size()
    }

    /// Number of buffered chunks.
    pub fn buffered_len(&self) -> usize {
        self.queue.len()
    }

    /// Capacity threshold of the internal buffer.
    pub fn high_water_mark(&self) -> usize {
        self.queue.high_water_mark()
    }

    /// Number of chunks pulled from the source so far.
    pub fn pulls(&self) -> u64 {
        self.pulls
    }

    /// The terminal error, if the stage failed.
    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    /// Registers a listener for every delivered chunk (flowing mode).
    pub fn on_data(&mut self, f: impl FnMut(&T) + Send + 'static) {
        self.on_data.on(f);
    }

    /// Registers a listener fired when buffered data becomes readable (pull mode).
    pub fn on_readable(&mut self, f: impl FnMut(&()) + Send + 'static) {
        self.on_readable.on(f);
    }

    /// Registers a listener for the single `end` notification.
    pub fn on_end(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_end.once(f);
    }

    /// Registers a listener for the single `error` notification.
    pub fn on_error(&mut self, f: impl FnOnce(&StreamError) + Send + 'static) {
        self.on_error.once(f);
    }

    /// Registers a listener fired once the source has been released.
    pub fn on_close(&mut self, f: impl FnOnce(&()) + Send + 'static) {
        self.on_close.once(f);
    }

    /// Starts or restarts a flowing session.
    ///
    /// No-op on a terminal stage.
    pub fn resume(&mut self) -> Result<(), StreamError> {
        if self.mode == Mode::Pull {
            return Err(StreamError::Protocol("resume() on a readable in pull mode"));
        }
        if self.state.is_terminal() {
            return Ok(());
        }
        self.mode = Mode::Flowing;
        if self.state != ReadableState::Flowing {
            self.transition(ReadableState::Flowing);
        }
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Halts a flowing session: no more `data` and no more source pulls.
    ///
    /// No-op on a terminal stage.
    pub fn pause(&mut self) -> Result<(), StreamError> {
        if self.mode == Mode::Pull {
            return Err(StreamError::Protocol("pause() on a readable in pull mode"));
        }
        if self.state.is_terminal() {
            return Ok(());
        }
        self.mode = Mode::Flowing;
        if self.state != ReadableState::Paused {
            self.transition(ReadableState::Paused);
        }
        Ok(())
    }

    /// Returns the next buffered chunk, or `None` if nothing is buffered.
    ///
    /// Never touches the source; pair it with [`poll_fill`](Self::poll_fill)
    /// or the `readable` notification. `None` after the source ended moves
    /// the stage to `Ended`.
    pub fn read(&mut self) -> Result<Option<T>, StreamError> {
        self.enter_pull()?;
        if let Some(chunk) = self.queue.dequeue() {
            return Ok(Some(chunk));
        }
        if self.queue.is_ended() {
            self.finish();
        }
        Ok(None)
    }

    /// Pulls from the source until something can be read.
    ///
    /// Resolves when the buffer holds a chunk or the source ended; keeps
    /// pulling opportunistically while the buffer is below its mark.
    pub fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        self.enter_pull()?;
        if self.state.is_terminal() {
            return Poll::Ready(Ok(()));
        }
        let was_empty = self.queue.is_empty();
        while self.wants_pull() {
            match self.poll_source(cx) {
                Poll::Ready(Ok(())) => continue,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => break,
            }
        }
        if !self.queue.is_empty() || self.queue.is_ended() {
            if was_empty {
                self.on_readable.emit(&());
            }
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    /// Pull-mode read that waits for the source.
    pub fn poll_read(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>, StreamError>> {
        match self.state {
            ReadableState::Ended => return Poll::Ready(Ok(None)),
            ReadableState::Errored if !self.error_reported => {
                self.error_reported = true;
                return Poll::Ready(Err(self.terminal_error()));
            }
            _ => {}
        }
        if let Err(e) = std::task::ready!(self.poll_fill(cx)) {
            if self.state == ReadableState::Errored {
                self.error_reported = true;
            }
            return Poll::Ready(Err(e));
        }
        Poll::Ready(self.read())
    }

    /// Drives a flowing session, handing every chunk to `deliver`.
    ///
    /// Resolves `Ok` once `end` fired, `Err` with the terminal error.
    /// Returns `Pending` while the source has nothing or the stage is
    /// paused; `resume()` wakes the task that polled last.
    pub fn poll_flow(
        &mut self,
        cx: &mut Context<'_>,
        deliver: &mut dyn FnMut(T) -> Flow,
    ) -> Poll<Result<(), StreamError>> {
        if self.mode == Mode::Pull {
            return Poll::Ready(Err(StreamError::Protocol(
                "flowing consumption of a readable in pull mode",
            )));
        }
        self.mode = Mode::Flowing;
        if self.state == ReadableState::Idle {
            self.transition(ReadableState::Flowing);
        }

        let mut budget = FLOW_BUDGET;
        loop {
            match self.state {
                ReadableState::Ended => return Poll::Ready(Ok(())),
                ReadableState::Errored => return Poll::Ready(Err(self.terminal_error())),
                ReadableState::Paused => {
                    self.waker = Some(cx.waker().clone());
                    return Poll::Pending;
                }
                ReadableState::Idle | ReadableState::Flowing => {}
            }

            if let Some(chunk) = self.queue.dequeue() {
                self.on_data.emit(&chunk);
                if deliver(chunk) == Flow::Pause && !self.state.is_terminal() {
                    self.transition(ReadableState::Paused);
                }
                budget -= 1;
                if budget == 0 {
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                continue;
            }

            if self.queue.is_ended() {
                self.finish();
                return Poll::Ready(Ok(()));
            }

            std::task::ready!(self.poll_source(cx))?;
        }
    }

    /// Async wrapper around [`poll_flow`](Self::poll_flow).
    pub async fn flow(&mut self, mut deliver: impl FnMut(T) -> Flow) -> Result<(), StreamError> {
        poll_fn(|cx| self.poll_flow(cx, &mut deliver)).await
    }

    /// Fails the stage with `err`: buffered chunks are discarded, the source
    /// is released and `error` fires once. Ignored on a terminal stage.
    pub fn destroy(&mut self, err: StreamError) {
        if self.state.is_terminal() {
            trace!(error = %err, "readable already terminal, ignoring destroy");
            return;
        }
        let discarded = self.queue.clear();
        trace!(discarded, error = %err, "readable destroyed");
        self.transition(ReadableState::Errored);
        self.error = Some(err.clone());
        self.release();
        self.on_error.emit(&err);
        self.on_close.emit(&());
        self.silence();
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    /// Cancels the stage with [`StreamError::Aborted`].
    pub fn abort(&mut self) {
        self.destroy(StreamError::Aborted(AbortReason::Requested));
    }

    fn enter_pull(&mut self) -> Result<(), StreamError> {
        match self.mode {
            Mode::Flowing => {
                return Err(StreamError::Protocol("read() on a readable in flowing mode"));
            }
            Mode::Unset => self.mode = Mode::Pull,
            Mode::Pull => {}
        }
        if self.state == ReadableState::Errored {
            return Err(StreamError::Protocol("read() after error"));
        }
        Ok(())
    }

    fn wants_pull(&self) -> bool {
        !self.queue.is_ended() && (self.queue.is_empty() || self.queue.is_below_mark())
    }

    /// One pull from the source.
    fn poll_source(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        match self.source.as_mut().poll_pull(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Some(chunk))) => {
                self.pulls += 1;
                self.queue.enqueue(chunk)?;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Ok(None)) => {
                trace!(pulls = self.pulls, "source exhausted");
                self.queue.mark_ended();
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                let err = StreamError::from_source(e);
                self.destroy(err.clone());
                Poll::Ready(Err(err))
            }
        }
    }

    fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(ReadableState::Ended);
        self.release();
        self.on_end.emit(&());
        self.on_close.emit(&());
        self.silence();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.as_mut().close();
        }
    }

    fn silence(&mut self) {
        self.on_data.close();
        self.on_readable.close();
        self.on_end.close();
        self.on_error.close();
        self.on_close.close();
    }

    fn terminal_error(&self) -> StreamError {
        self.error.clone().unwrap_or(StreamError::Closed)
    }

    fn transition(&mut self, to: ReadableState) {
        trace!(from = ?self.state, to = ?to, "readable transition");
        self.state = to;
    }
}

impl<T: Unpin> Stream for Readable<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state == ReadableState::Errored && this.error_reported {
            return Poll::Ready(None);
        }
        match std::task::ready!(this.poll_read(cx)) {
            Ok(Some(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Ok(None) => Poll::Ready(None),
            Err(e) => {
                this.error_reported = true;
                Poll::Ready(Some(Err(e)))
            }
        }
    }
}

impl<T> fmt::Debug for Readable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readable")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("buffered", &self.queue.size())
            .field("high_water_mark", &self.queue.high_water_mark())
            .field("pulls", &self.pulls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StreamSource;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn noop_cx() -> Context<'static> {
        Context::from_waker(Waker::noop())
    }

    fn failing(after: u32, config: StreamConfig) -> Readable<u32> {
        let items = (0..after)
            .map(Ok)
            .chain(std::iter::once(Err(std::io::Error::other("disk gone"))));
        Readable::objects(StreamSource::new(futures_util::stream::iter(items)), config)
    }

    #[tokio::test]
    async fn test_flowing_delivers_in_order() {
        let mut readable = Readable::from_items(0..100u32, StreamConfig::objects());
        let ends = Arc::new(AtomicUsize::new(0));
        let data = Arc::new(Mutex::new(Vec::new()));
        {
            let ends = ends.clone();
            readable.on_end(move |_| {
                ends.fetch_add(1, Ordering::SeqCst);
            });
            let data = data.clone();
            readable.on_data(move |n| data.lock().unwrap().push(*n));
        }

        let mut seen = Vec::new();
        readable
            .flow(|n| {
                seen.push(n);
                Flow::Continue
            })
            .await
            .unwrap();

        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert_eq!(*data.lock().unwrap(), seen);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(readable.state(), ReadableState::Ended);
    }

    #[test]
    fn test_pause_stops_pulling() {
        let mut readable = Readable::from_items(0..10u32, StreamConfig::objects());
        let mut cx = noop_cx();
        let mut seen = Vec::new();

        let poll = readable.poll_flow(&mut cx, &mut |n| {
            seen.push(n);
            Flow::Pause
        });
        assert!(poll.is_pending());
        assert!(readable.is_paused());
        assert_eq!(seen, vec![0]);
        assert_eq!(readable.pulls(), 1);

        // Still paused: polling again delivers nothing.
        assert!(readable.poll_flow(&mut cx, &mut |n| {
            seen.push(n);
            Flow::Continue
        })
        .is_pending());
        assert_eq!(readable.pulls(), 1);

        readable.resume().unwrap();
        let poll = readable.poll_flow(&mut cx, &mut |n| {
            seen.push(n);
            Flow::Continue
        });
        assert!(matches!(poll, Poll::Ready(Ok(()))));
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_flow_yields_after_budget() {
        let mut readable = Readable::from_items(0..(FLOW_BUDGET as u32 * 2), StreamConfig::objects());
        let mut cx = noop_cx();
        let mut count = 0;

        let poll = readable.poll_flow(&mut cx, &mut |_| {
            count += 1;
            Flow::Continue
        });
        assert!(poll.is_pending());
        assert_eq!(count, FLOW_BUDGET);
    }

    #[test]
    fn test_pull_respects_high_water_mark() {
        let mut readable = Readable::from_items(0..10u32, StreamConfig::new(2).unwrap());
        let mut cx = noop_cx();

        assert!(readable.read().unwrap().is_none());
        assert!(matches!(readable.poll_fill(&mut cx), Poll::Ready(Ok(()))));
        assert_eq!(readable.pulls(), 2);
        assert_eq!(readable.buffered_len(), 2);

        assert_eq!(readable.read().unwrap(), Some(0));
        assert_eq!(readable.read().unwrap(), Some(1));
        assert_eq!(readable.read().unwrap(), None);
        assert_eq!(readable.state(), ReadableState::Idle);
    }

    #[test]
    fn test_readable_fires_once_per_refill() {
        let mut readable = Readable::from_items(0..3u32, StreamConfig::new(1).unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = hits.clone();
        readable.on_readable(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        let mut cx = noop_cx();

        assert!(readable.poll_fill(&mut cx).is_ready());
        assert!(readable.poll_fill(&mut cx).is_ready());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        readable.read().unwrap();
        assert!(readable.poll_fill(&mut cx).is_ready());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mixing_protocols_is_rejected() {
        let mut pulled = Readable::from_items([1u8], StreamConfig::objects());
        pulled.read().unwrap();
        assert!(pulled.resume().unwrap_err().is_protocol());
        assert!(pulled.pause().unwrap_err().is_protocol());
        let poll = pulled.poll_flow(&mut noop_cx(), &mut |_| Flow::Continue);
        assert!(matches!(poll, Poll::Ready(Err(StreamError::Protocol(_)))));

        let mut flowing = Readable::from_items([1u8], StreamConfig::objects());
        flowing.resume().unwrap();
        assert!(flowing.read().unwrap_err().is_protocol());
    }

    #[tokio::test]
    async fn test_stream_reports_source_error_once() {
        let mut readable = failing(2, StreamConfig::new(1).unwrap());
        let errors = Arc::new(AtomicUsize::new(0));
        let inner = errors.clone();
        readable.on_error(move |err| {
            assert!(matches!(err, StreamError::Source(_)));
            inner.fetch_add(1, Ordering::SeqCst);
        });

        let items: Vec<_> = (&mut readable).collect().await;
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], Ok(0)));
        assert!(matches!(items[1], Ok(1)));
        assert!(matches!(&items[2], Err(StreamError::Source(e)) if e.to_string() == "disk gone"));

        assert_eq!(readable.state(), ReadableState::Errored);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(readable.next().await.is_none());
    }

    #[tokio::test]
    async fn test_source_error_discards_buffered_chunks() {
        // Both chunks fit under the mark, so they are buffered when the
        // failure arrives on the same fill.
        let mut readable = failing(2, StreamConfig::objects());
        let items: Vec<_> = (&mut readable).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamError::Source(_))));
        assert_eq!(Readable::buffered(&readable), 0);
    }

    #[tokio::test]
    async fn test_flowing_error_suppresses_end() {
        let mut readable = failing(1, StreamConfig::new(1).unwrap());
        let ended = Arc::new(AtomicUsize::new(0));
        let inner = ended.clone();
        readable.on_end(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });

        let result = readable.flow(|_| Flow::Continue).await;
        assert!(matches!(result, Err(StreamError::Source(_))));
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_destroy_discards_buffer() {
        let mut readable = Readable::from_items(0..5u32, StreamConfig::objects());
        let closes = Arc::new(AtomicUsize::new(0));
        let inner = closes.clone();
        readable.on_close(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        assert!(readable.poll_fill(&mut noop_cx()).is_ready());
        assert!(Readable::buffered(&readable) > 0);

        readable.abort();
        readable.destroy(StreamError::Closed);

        assert_eq!(Readable::buffered(&readable), 0);
        assert!(matches!(
            readable.error(),
            Some(StreamError::Aborted(AbortReason::Requested))
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(readable.read().unwrap_err().is_protocol());
    }
}
