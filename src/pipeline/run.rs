//! The pipeline future and its builder.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tracing::{debug, trace};

use super::abort::{AbortHandle, AbortState};
use super::hop::{Hop, Piped};
use super::meter::{ByteView, Meter, PipelineReport, Progress};
use super::{Inlet, Outlet};
use crate::error::{AbortReason, StreamError};
use crate::transform::Transform;

/// Where a pipeline run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Moving chunks.
    Running,
    /// The source ended; waiting for the sink to finish.
    Draining,
    /// The sink finished. Terminal.
    Completed,
    /// A stage failed or the run was aborted. Terminal.
    Failed,
}

impl PipelineState {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

type Wrap<S, T> = Box<dyn FnOnce(Box<dyn Inlet<T> + Send>) -> Box<dyn Inlet<S> + Send> + Send>;

/// Assembles a pipeline from a source, zero or more transforms and a sink.
///
/// `S` is the source's chunk type and `T` the chunk type at the current end
/// of the chain.
///
/// ```
/// use chunkflow::{CollectSink, PipelineBuilder, Readable, StreamConfig, Transform, Writable};
///
/// # tokio_test::block_on(async {
/// let source = Readable::from_items(["ab".to_string(), "cd".to_string()], StreamConfig::objects());
/// let (sink, handle) = CollectSink::new();
///
/// let report = PipelineBuilder::new(source)
///     .through(Transform::map(StreamConfig::default(), |s: String| s.to_uppercase()))
///     .into_sink(Writable::objects(sink, StreamConfig::objects()))
///     .await?;
///
/// assert_eq!(handle.items(), ["AB", "CD"]);
/// assert_eq!(report.chunks, 2);
/// # Ok::<(), chunkflow::StreamError>(())
/// # }).unwrap();
/// ```
pub struct PipelineBuilder<S, T> {
    source: Box<dyn Outlet<S> + Send>,
    wrap: Wrap<S, T>,
    bytes: Option<ByteView<T>>,
}

impl<S: 'static> PipelineBuilder<S, S> {
    /// Starts a pipeline at `source`.
    pub fn new(source: impl Outlet<S> + Send + 'static) -> Self {
        Self {
            source: Box::new(source),
            wrap: Box::new(|inlet: Box<dyn Inlet<S> + Send>| inlet),
            bytes: None,
        }
    }
}

impl<S: 'static, T: Send + 'static> PipelineBuilder<S, T> {
    /// Appends a transform.
    ///
    /// Chunk types change here, so a digest requested earlier is dropped;
    /// request it after the last transform.
    pub fn through<U: Send + 'static>(self, transform: Transform<T, U>) -> PipelineBuilder<S, U> {
        if self.bytes.is_some() {
            debug!("digest request dropped by through()");
        }
        let wrap = self.wrap;
        PipelineBuilder {
            source: self.source,
            wrap: Box::new(move |downstream: Box<dyn Inlet<U> + Send>| {
                wrap(Box::new(Piped::new(transform, downstream)))
            }),
            bytes: None,
        }
    }

    /// Terminates the chain at `sink` and returns the runnable pipeline.
    pub fn into_sink(self, sink: impl Inlet<T> + Send + 'static) -> Pipeline<S> {
        let progress = Arc::new(Progress::default());
        let meter = Meter::new(Box::new(sink), progress.clone(), self.bytes);
        let inlet = (self.wrap)(Box::new(meter));
        Pipeline::assemble(self.source, inlet, progress)
    }
}

#[cfg(feature = "hash-blake3")]
impl<S, T: AsRef<[u8]>> PipelineBuilder<S, T> {
    /// Computes a BLAKE3 digest of every byte handed to the sink; it is
    /// returned in [`PipelineReport::digest`].
    pub fn with_digest(mut self) -> Self {
        self.bytes = Some(<T as AsRef<[u8]>>::as_ref);
        self
    }
}

/// A single data transfer from a source, through transforms, into a sink.
///
/// The pipeline is a future: awaiting it drives every stage from the
/// calling task and resolves with a [`PipelineReport`] once the sink
/// finished, or with the first error any stage reported. On failure every
/// stage is torn down with that error; errors raised during the teardown
/// are logged, never returned.
///
/// Backpressure is automatic: when a stage's `write` returns `false` the
/// stage feeding it is paused, and resumed once the blocked stage drained.
pub struct Pipeline<T> {
    source: Box<dyn Outlet<T> + Send>,
    hop: Hop<T>,
    state: PipelineState,
    abort: Arc<AbortState>,
    progress: Arc<Progress>,
    started: Option<Instant>,
    outcome: Option<StreamError>,
}

impl<T: 'static> Pipeline<T> {
    /// Pipes `source` straight into `sink`.
    pub fn new(
        source: impl Outlet<T> + Send + 'static,
        sink: impl Inlet<T> + Send + 'static,
    ) -> Self
    where
        T: Send,
    {
        PipelineBuilder::new(source).into_sink(sink)
    }

    /// Starts a builder at `source`.
    pub fn builder(source: impl Outlet<T> + Send + 'static) -> PipelineBuilder<T, T> {
        PipelineBuilder::new(source)
    }
}

impl<T> Pipeline<T> {
    fn assemble(
        source: Box<dyn Outlet<T> + Send>,
        inlet: Box<dyn Inlet<T> + Send>,
        progress: Arc<Progress>,
    ) -> Self {
        Self {
            source,
            hop: Hop::new(inlet),
            state: PipelineState::Running,
            abort: Arc::default(),
            progress,
            started: None,
            outcome: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Forward-progress counter: chunks delivered to the sink plus drains.
    pub fn progress(&self) -> u64 {
        self.progress.ticks()
    }

    /// Returns a handle that can abort this pipeline from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.abort.clone())
    }

    /// Cancels the run.
    ///
    /// Stops pulling from the source, discards buffered chunks, releases
    /// every resource and moves each stage to its errored state with
    /// [`StreamError::Aborted`]. The next poll resolves with that error. No
    /// stage notification fires afterwards. No-op once terminal.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.abort.request(AbortReason::Requested);
        let err = self.fail(StreamError::Aborted(AbortReason::Requested));
        self.outcome = Some(err);
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        debug!(error = %err, progress = self.progress.ticks(), "pipeline failed");
        self.source.destroy(err.clone());
        self.hop.destroy(err.clone());
        self.transition(PipelineState::Failed);
        err
    }

    fn transition(&mut self, to: PipelineState) {
        trace!(from = ?self.state, to = ?to, "pipeline transition");
        self.state = to;
    }
}

impl<T> Future for Pipeline<T> {
    type Output = Result<PipelineReport, StreamError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.state.is_terminal() {
            return Poll::Ready(Err(this
                .outcome
                .take()
                .unwrap_or(StreamError::State("pipeline polled after completion"))));
        }

        let started = *this.started.get_or_insert_with(Instant::now);
        this.abort.register(cx.waker());
        if let Some(reason) = this.abort.reason() {
            return Poll::Ready(Err(this.fail(StreamError::Aborted(reason))));
        }

        match this.hop.poll_hop(this.source.as_mut(), cx) {
            Poll::Ready(Ok(())) => {
                this.transition(PipelineState::Completed);
                let report = this.progress.report(started.elapsed());
                debug!(
                    chunks = report.chunks,
                    weight = report.weight,
                    drains = report.drains,
                    "pipeline completed"
                );
                Poll::Ready(Ok(report))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(this.fail(e))),
            Poll::Pending => {
                if this.hop.is_draining() && this.state == PipelineState::Running {
                    this.transition(PipelineState::Draining);
                }
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("progress", &self.progress.ticks())
            .finish()
    }
}
