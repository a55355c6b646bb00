//! Cross-task cancellation of a running pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::Waker;

use futures_util::task::AtomicWaker;

use crate::error::AbortReason;

const NONE: u8 = 0;
const REQUESTED: u8 = 1;
const STALLED: u8 = 2;

#[derive(Debug, Default)]
pub(crate) struct AbortState {
    reason: AtomicU8,
    waker: AtomicWaker,
}

impl AbortState {
    /// Records the first abort request and wakes the pipeline task.
    pub(crate) fn request(&self, reason: AbortReason) {
        let code = match reason {
            AbortReason::Requested => REQUESTED,
            AbortReason::Stalled => STALLED,
        };
        if self
            .reason
            .compare_exchange(NONE, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.waker.wake();
        }
    }

    pub(crate) fn reason(&self) -> Option<AbortReason> {
        match self.reason.load(Ordering::Acquire) {
            REQUESTED => Some(AbortReason::Requested),
            STALLED => Some(AbortReason::Stalled),
            _ => None,
        }
    }

    pub(crate) fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }
}

/// Aborts a [`Pipeline`](super::Pipeline) from anywhere.
///
/// Cloneable and `Send`. The pipeline notices on its next poll (the handle
/// wakes it) and tears down exactly as [`Pipeline::abort`](super::Pipeline::abort)
/// does. Only the first request counts.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    state: Arc<AbortState>,
}

impl AbortHandle {
    pub(crate) fn new(state: Arc<AbortState>) -> Self {
        Self { state }
    }

    /// Requests cancellation with [`AbortReason::Requested`].
    pub fn abort(&self) {
        self.state.request(AbortReason::Requested);
    }

    /// Requests cancellation with an explicit reason.
    #[cfg_attr(not(feature = "tokio"), allow(dead_code))]
    pub(crate) fn abort_with(&self, reason: AbortReason) {
        self.state.request(reason);
    }

    /// Returns true once cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        self.state.reason().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let handle = AbortHandle::new(Arc::default());
        assert!(!handle.is_aborted());

        handle.abort_with(AbortReason::Stalled);
        handle.abort();
        assert_eq!(handle.state.reason(), Some(AbortReason::Stalled));
    }
}
