//! One link of a pipeline: an upstream outlet flowing into a downstream inlet.

use std::task::{Context, Poll};

use tracing::{debug, trace, warn};

use super::{Inlet, Outlet};
use crate::error::StreamError;
use crate::readable::Flow;
use crate::transform::Transform;

/// Rounds of write/drive per poll before yielding to the scheduler.
const HOP_ROUNDS: usize = 16;

/// Moves chunks from an upstream [`Outlet`] into a downstream [`Inlet`],
/// pausing upstream when the downstream reports backpressure and resuming
/// it once the downstream drained.
pub(crate) struct Hop<T> {
    downstream: Box<dyn Inlet<T> + Send>,
    paused: bool,
    upstream_done: bool,
    end_sent: bool,
}

impl<T> Hop<T> {
    pub(crate) fn new(downstream: Box<dyn Inlet<T> + Send>) -> Self {
        Self {
            downstream,
            paused: false,
            upstream_done: false,
            end_sent: false,
        }
    }

    /// Upstream ended; only the downstream flush is left.
    pub(crate) fn is_draining(&self) -> bool {
        self.upstream_done
    }

    /// Resolves `Ok` once upstream ended and the downstream finished.
    pub(crate) fn poll_hop(
        &mut self,
        upstream: &mut dyn Outlet<T>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), StreamError>> {
        for _ in 0..HOP_ROUNDS {
            match self.downstream.poll_drive(cx) {
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) if self.end_sent => return Poll::Ready(Ok(())),
                Poll::Ready(Ok(())) => {
                    return Poll::Ready(Err(StreamError::State("downstream finished before end")));
                }
                Poll::Pending => {}
            }

            if self.upstream_done {
                if self.end_sent {
                    return Poll::Pending;
                }
                if self.downstream.needs_drain() {
                    trace!("upstream ended while downstream blocked, deferring end");
                    return Poll::Pending;
                }
                self.downstream.end()?;
                self.end_sent = true;
                continue;
            }

            if self.paused {
                if self.downstream.needs_drain() {
                    return Poll::Pending;
                }
                self.paused = false;
                upstream.resume()?;
                trace!("upstream resumed after drain");
            }

            let downstream = &mut self.downstream;
            let paused = &mut self.paused;
            let mut failure = None;
            let mut moved = 0usize;
            let poll = upstream.poll_flow(cx, &mut |chunk| {
                moved += 1;
                match downstream.write(chunk) {
                    Ok(true) => Flow::Continue,
                    Ok(false) => {
                        *paused = true;
                        Flow::Pause
                    }
                    Err(e) => {
                        failure.get_or_insert(e);
                        Flow::Pause
                    }
                }
            });

            if let Some(err) = failure {
                if let Poll::Ready(Err(other)) = &poll {
                    warn!(error = %other, "upstream error after downstream failure, ignoring");
                }
                return Poll::Ready(Err(err));
            }
            match poll {
                Poll::Ready(Ok(())) => {
                    debug!("upstream ended");
                    self.upstream_done = true;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending if moved == 0 && !self.paused => return Poll::Pending,
                Poll::Pending => {}
            }
        }
        cx.waker().wake_by_ref();
        Poll::Pending
    }

    pub(crate) fn destroy(&mut self, err: StreamError) {
        self.downstream.destroy(err);
    }
}

/// A transform together with everything downstream of it, seen as one inlet.
pub(crate) struct Piped<I, O> {
    transform: Transform<I, O>,
    hop: Hop<O>,
}

impl<I, O> Piped<I, O> {
    pub(crate) fn new(transform: Transform<I, O>, downstream: Box<dyn Inlet<O> + Send>) -> Self {
        Self {
            transform,
            hop: Hop::new(downstream),
        }
    }
}

impl<I, O> Transform<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Joins this transform with its downstream into a single inlet, for
    /// use as a [`Tee`](super::Tee) branch or a pipeline sink.
    pub fn into_inlet(self, downstream: impl Inlet<O> + Send + 'static) -> impl Inlet<I> + Send {
        Piped::new(self, Box::new(downstream))
    }
}

impl<I, O> Inlet<I> for Piped<I, O> {
    fn write(&mut self, chunk: I) -> Result<bool, StreamError> {
        self.transform.write(chunk)
    }

    fn end(&mut self) -> Result<(), StreamError> {
        self.transform.end(None)
    }

    fn needs_drain(&self) -> bool {
        self.transform.needs_drain()
    }

    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        self.hop.poll_hop(&mut self.transform, cx)
    }

    fn destroy(&mut self, err: StreamError) {
        self.transform.destroy(err.clone());
        self.hop.destroy(err);
    }

    fn weigh(&self, chunk: &I) -> usize {
        self.transform.weigh_input(chunk)
    }
}
