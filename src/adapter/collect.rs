//! In-memory sink with an inspection handle.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use crate::error::BoxError;
use crate::writable::Sink;

#[derive(Debug)]
struct Collected<T> {
    items: Vec<T>,
    pushes: usize,
    finalized: bool,
    closed: bool,
}

/// Read side of a [`CollectSink`], usable after the sink moved into a stage.
#[derive(Debug)]
pub struct CollectHandle<T> {
    inner: Arc<Mutex<Collected<T>>>,
}

impl<T> Clone for CollectHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> CollectHandle<T> {
    fn lock(&self) -> MutexGuard<'_, Collected<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of confirmed chunks.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns true if nothing has been confirmed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `start_push` calls, including a failed one.
    pub fn pushes(&self) -> usize {
        self.lock().pushes
    }

    /// Returns true once the sink was finalized.
    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    /// Returns true once the sink was released without finalizing.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Takes the confirmed chunks out.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut self.lock().items)
    }
}

impl<T: Clone> CollectHandle<T> {
    /// Copies the confirmed chunks.
    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }
}

/// Sink that stores every confirmed chunk in memory.
///
/// Pushes can be made to take several polls (`with_latency`) and to fail
/// (`fail_after`), which is how backpressure and failure paths are
/// exercised without real I/O.
#[derive(Debug)]
pub struct CollectSink<T> {
    inner: Arc<Mutex<Collected<T>>>,
    in_flight: Option<T>,
    latency: usize,
    remaining: usize,
    fail_after: Option<usize>,
}

impl<T> CollectSink<T> {
    /// Creates a sink and its inspection handle.
    pub fn new() -> (Self, CollectHandle<T>) {
        let inner = Arc::new(Mutex::new(Collected {
            items: Vec::new(),
            pushes: 0,
            finalized: false,
            closed: false,
        }));
        let handle = CollectHandle {
            inner: inner.clone(),
        };
        let sink = Self {
            inner,
            in_flight: None,
            latency: 0,
            remaining: 0,
            fail_after: None,
        };
        (sink, handle)
    }

    /// Every push stays pending for `polls` polls before it is confirmed.
    pub fn with_latency(mut self, polls: usize) -> Self {
        self.latency = polls;
        self
    }

    /// Accepts `n` pushes, then fails every following one.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Collected<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Send + Unpin> Sink for CollectSink<T> {
    type Item = T;

    fn start_push(self: Pin<&mut Self>, chunk: T) -> Result<(), BoxError> {
        let this = self.get_mut();
        let pushes = {
            let mut inner = this.lock();
            inner.pushes += 1;
            inner.pushes
        };
        if this.fail_after.is_some_and(|n| pushes > n) {
            return Err(format!("push {} rejected", pushes).into());
        }
        this.in_flight = Some(chunk);
        this.remaining = this.latency;
        Ok(())
    }

    fn poll_pushed(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        let this = self.get_mut();
        if this.remaining > 0 {
            this.remaining -= 1;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        if let Some(chunk) = this.in_flight.take() {
            this.lock().items.push(chunk);
        }
        Poll::Ready(Ok(()))
    }

    fn poll_finalize(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        self.lock().finalized = true;
        Poll::Ready(Ok(()))
    }

    fn close(self: Pin<&mut Self>) {
        let this = self.get_mut();
        this.in_flight = None;
        this.lock().closed = true;
    }
}
