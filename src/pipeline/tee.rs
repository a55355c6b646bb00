//! Fan-out to several inlets.

use std::fmt;
use std::task::{Context, Poll};

use tracing::warn;

use super::Inlet;
use crate::error::StreamError;

/// Writes every chunk to each of its branches.
///
/// `write` reports backpressure if any branch does, the tee counts as
/// drained once no branch is blocked, and it finishes once every branch
/// finished. The first branch failure fails the tee; failures reported by
/// other branches in the same round are logged and dropped.
///
/// A branch is any [`Inlet`]: a [`Writable`](crate::Writable), another tee,
/// or a transform chain built with
/// [`Transform::into_inlet`](crate::Transform::into_inlet).
pub struct Tee<T> {
    branches: Vec<Box<dyn Inlet<T> + Send>>,
    finished: Vec<bool>,
    ended: bool,
}

impl<T: Clone> Tee<T> {
    /// Creates a tee without branches.
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            finished: Vec::new(),
            ended: false,
        }
    }

    /// Adds a branch.
    pub fn branch(mut self, inlet: impl Inlet<T> + Send + 'static) -> Self {
        self.branches.push(Box::new(inlet));
        self.finished.push(false);
        self
    }
}

impl<T: Clone> Default for Tee<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tee<T> {
    /// Number of branches.
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Returns true if there are no branches.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

impl<T: Clone> Inlet<T> for Tee<T> {
    fn write(&mut self, chunk: T) -> Result<bool, StreamError> {
        let Some((last, rest)) = self.branches.split_last_mut() else {
            return Ok(true);
        };
        let mut accepting = true;
        for branch in rest {
            accepting &= branch.write(chunk.clone())?;
        }
        accepting &= last.write(chunk)?;
        Ok(accepting)
    }

    fn end(&mut self) -> Result<(), StreamError> {
        for branch in &mut self.branches {
            branch.end()?;
        }
        self.ended = true;
        Ok(())
    }

    fn needs_drain(&self) -> bool {
        self.branches.iter().any(|b| b.needs_drain())
    }

    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        let mut first: Option<StreamError> = None;
        for (branch, done) in self.branches.iter_mut().zip(self.finished.iter_mut()) {
            if *done {
                continue;
            }
            match branch.poll_drive(cx) {
                Poll::Ready(Ok(())) => *done = true,
                Poll::Ready(Err(e)) => match &first {
                    None => first = Some(e),
                    Some(_) => warn!(error = %e, "tee branch failed after another, ignoring"),
                },
                Poll::Pending => {}
            }
        }
        if let Some(err) = first {
            return Poll::Ready(Err(err));
        }
        // Without branches every chunk is dropped, and the tee only
        // finishes once it was ended.
        if self.ended && self.finished.iter().all(|done| *done) {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    fn destroy(&mut self, err: StreamError) {
        for branch in &mut self.branches {
            branch.destroy(err.clone());
        }
    }

    fn weigh(&self, chunk: &T) -> usize {
        self.branches.first().map_or(1, |b| b.weigh(chunk))
    }
}

impl<T> fmt::Debug for Tee<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tee")
            .field("branches", &self.branches.len())
            .field("finished", &self.finished.iter().filter(|d| **d).count())
            .field("ended", &self.ended)
            .finish()
    }
}
