//! Delivery accounting at the terminal stage of a pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use super::Inlet;
use crate::chunk::Digest;
use crate::error::StreamError;

#[cfg(feature = "hash-blake3")]
use crate::hash::Blake3Hasher;

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Chunks handed to the terminal stage.
    pub chunks: u64,
    /// Their total weight.
    pub weight: u64,
    /// Drains observed at the terminal stage.
    pub drains: u64,
    /// Writes made while the terminal stage owed a drain.
    pub violations: u64,
    /// Wall time from the first poll to completion.
    pub elapsed: Duration,
    /// BLAKE3 digest of the delivered bytes, when requested.
    pub digest: Option<Digest>,
}

/// Counters shared between the terminal meter, the pipeline and watchdogs.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    chunks: AtomicU64,
    weight: AtomicU64,
    drains: AtomicU64,
    violations: AtomicU64,
    digest: Mutex<DigestState>,
}

impl Progress {
    /// Forward-progress ticks: chunks delivered plus drains.
    pub(crate) fn ticks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed) + self.drains.load(Ordering::Relaxed)
    }

    pub(crate) fn report(&self, elapsed: Duration) -> PipelineReport {
        let digest = self
            .digest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .finalize();
        PipelineReport {
            chunks: self.chunks.load(Ordering::Relaxed),
            weight: self.weight.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            elapsed,
            digest,
        }
    }

    #[cfg(feature = "hash-blake3")]
    fn digest(&self) -> std::sync::MutexGuard<'_, DigestState> {
        self.digest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Running digest of delivered bytes.
#[cfg(feature = "hash-blake3")]
#[derive(Debug, Default)]
struct DigestState {
    hasher: Option<Blake3Hasher>,
}

#[cfg(not(feature = "hash-blake3"))]
#[derive(Debug, Default)]
struct DigestState;

#[cfg(feature = "hash-blake3")]
impl DigestState {
    fn enable(&mut self) {
        self.hasher = Some(Blake3Hasher::new());
    }

    fn update(&mut self, data: &[u8]) {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(data);
        }
    }

    fn finalize(&self) -> Option<Digest> {
        self.hasher.as_ref().map(Blake3Hasher::finalize)
    }
}

#[cfg(not(feature = "hash-blake3"))]
impl DigestState {
    fn finalize(&self) -> Option<Digest> {
        None
    }
}

/// Byte view of a chunk, for the digest.
pub(crate) type ByteView<T> = fn(&T) -> &[u8];

/// Wraps the terminal inlet and records what reaches it.
pub(crate) struct Meter<T> {
    inner: Box<dyn Inlet<T> + Send>,
    progress: Arc<Progress>,
    blocked: bool,
    #[cfg_attr(not(feature = "hash-blake3"), allow(dead_code))]
    bytes: Option<ByteView<T>>,
}

impl<T> Meter<T> {
    pub(crate) fn new(
        inner: Box<dyn Inlet<T> + Send>,
        progress: Arc<Progress>,
        bytes: Option<ByteView<T>>,
    ) -> Self {
        #[cfg(feature = "hash-blake3")]
        if bytes.is_some() {
            progress.digest().enable();
        }
        Self {
            inner,
            progress,
            blocked: false,
            bytes,
        }
    }
}

impl<T> Inlet<T> for Meter<T> {
    fn write(&mut self, chunk: T) -> Result<bool, StreamError> {
        if self.blocked {
            self.progress.violations.fetch_add(1, Ordering::Relaxed);
        }
        let weight = self.inner.weigh(&chunk) as u64;
        #[cfg(feature = "hash-blake3")]
        if let Some(bytes) = self.bytes {
            self.progress.digest().update(bytes(&chunk));
        }
        let accepting = self.inner.write(chunk)?;
        self.progress.chunks.fetch_add(1, Ordering::Relaxed);
        self.progress.weight.fetch_add(weight, Ordering::Relaxed);
        if !accepting {
            self.blocked = true;
        }
        Ok(accepting)
    }

    fn end(&mut self) -> Result<(), StreamError> {
        self.inner.end()
    }

    fn needs_drain(&self) -> bool {
        self.inner.needs_drain()
    }

    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
        let poll = self.inner.poll_drive(cx);
        if self.blocked && !self.inner.needs_drain() {
            self.blocked = false;
            self.progress.drains.fetch_add(1, Ordering::Relaxed);
        }
        poll
    }

    fn destroy(&mut self, err: StreamError) {
        self.inner.destroy(err);
    }

    fn weigh(&self, chunk: &T) -> usize {
        self.inner.weigh(chunk)
    }
}
