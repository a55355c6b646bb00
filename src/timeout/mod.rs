//! Stall watchdog for pipelines (requires the `tokio` feature).
//!
//! A pipeline makes progress when a chunk reaches its sink or a blocked
//! stage drains. The watchdog aborts the run with
//! [`AbortReason::Stalled`] once neither happened for a whole interval.

use std::pin::pin;
use std::time::Duration;

use futures_util::future::{Either, select};
use tracing::{trace, warn};

use crate::error::{AbortReason, Result};
use crate::pipeline::{Pipeline, PipelineReport};

/// Runs `pipeline` to completion, aborting it when it stalls for `stall`.
///
/// Resolves like the pipeline itself; a stall surfaces as
/// [`StreamError::Aborted`](crate::StreamError::Aborted) with
/// [`AbortReason::Stalled`], after every stage was torn down.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use chunkflow::{CollectSink, Pipeline, Readable, StreamConfig, Writable};
/// use chunkflow::timeout::run_with_stall_timeout;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> chunkflow::Result<()> {
/// let (sink, handle) = CollectSink::new();
/// let pipeline = Pipeline::new(
///     Readable::from_items([1u8, 2, 3], StreamConfig::objects()),
///     Writable::objects(sink, StreamConfig::objects()),
/// );
/// run_with_stall_timeout(pipeline, Duration::from_secs(5)).await?;
/// assert_eq!(handle.items(), [1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub async fn run_with_stall_timeout<T>(
    mut pipeline: Pipeline<T>,
    stall: Duration,
) -> Result<PipelineReport> {
    let abort = pipeline.abort_handle();
    let mut seen = pipeline.progress();
    loop {
        let tick = pin!(tokio::time::sleep(stall));
        let outcome = select(&mut pipeline, tick).await;
        if let Either::Left((result, _)) = outcome {
            return result;
        }

        let now = pipeline.progress();
        if now == seen {
            warn!(
                stall_ms = stall.as_millis() as u64,
                progress = now,
                "pipeline stalled, aborting"
            );
            abort.abort_with(AbortReason::Stalled);
            return pipeline.await;
        }
        trace!(progress = now, "pipeline progressing");
        seen = now;
    }
}
