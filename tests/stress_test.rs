// Randomized schedule tests
// Tests cover: buffer bounds under backpressure, terminal notifications under random pause/resume and sink timing

use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use chunkflow::{
    CollectSink, Flow, IterSource, Readable, StreamConfig, StreamError, Transform, Writable,
};
use proptest::prelude::*;

/// Upper bound on driver rounds before a schedule counts as stuck.
const MAX_ROUNDS: usize = 100_000;

/// Records lifecycle notifications by name.
#[derive(Clone, Default)]
struct Tally(Arc<Mutex<Vec<&'static str>>>);

impl Tally {
    fn note(&self, event: &'static str) -> impl FnOnce(&()) + Send + 'static {
        let events = self.0.clone();
        move |_: &()| events.lock().unwrap().push(event)
    }

    fn note_error(&self, event: &'static str) -> impl FnOnce(&StreamError) + Send + 'static {
        let events = self.0.clone();
        move |_: &StreamError| events.lock().unwrap().push(event)
    }

    fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| **e == event).count()
    }
}

struct Schedule {
    sizes: Vec<usize>,
    hwms: (usize, usize, usize),
    latency: usize,
    pauses: Vec<bool>,
    fail_at: Option<usize>,
}

/// Drives readable -> transform -> writable by hand, honoring every
/// backpressure answer, and checks buffer bounds after each step.
fn run_schedule(schedule: Schedule) -> Result<(), TestCaseError> {
    let parts: Vec<Bytes> = schedule
        .sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| Bytes::from(vec![i as u8; n]))
        .collect();
    let max_chunk = schedule.sizes.iter().copied().max().unwrap_or(0);
    let (source_hwm, transform_hwm, sink_hwm) = schedule.hwms;

    let (sink, handle) = CollectSink::<Bytes>::new();
    let sink = sink.with_latency(schedule.latency);
    let sink = match schedule.fail_at {
        Some(n) => sink.fail_after(n),
        None => sink,
    };

    let readable_events = Tally::default();
    let transform_events = Tally::default();
    let writable_events = Tally::default();

    let mut readable = Readable::new(
        IterSource::new(parts.clone()),
        StreamConfig::new(source_hwm).unwrap(),
    );
    readable.on_end(readable_events.note("end"));
    readable.on_error(readable_events.note_error("error"));
    readable.on_close(readable_events.note("close"));

    let mut transform: Transform<Bytes, Bytes> =
        Transform::pass_through(StreamConfig::new(transform_hwm).unwrap());
    transform.on_finish(transform_events.note("finish"));
    transform.on_end(transform_events.note("end"));
    transform.on_error(transform_events.note_error("error"));
    transform.on_close(transform_events.note("close"));

    let mut writable = Writable::new(sink, StreamConfig::new(sink_hwm).unwrap());
    writable.on_finish(writable_events.note("finish"));
    writable.on_error(writable_events.note_error("error"));
    writable.on_close(writable_events.note("close"));

    macro_rules! check_bounds {
        () => {
            prop_assert!(readable.buffered() <= source_hwm + max_chunk);
            prop_assert!(transform.buffered_input() <= transform_hwm + max_chunk);
            prop_assert!(transform.buffered_output() <= transform_hwm + max_chunk);
            prop_assert!(writable.buffered() <= sink_hwm + max_chunk);
        };
    }

    let mut cx = Context::from_waker(Waker::noop());
    let mut step = 0usize;
    let mut readable_done = false;
    let mut transform_ended = false;
    let mut transform_done = false;
    let mut writable_ended = false;
    let mut hold_readable = false;
    let mut hold_transform = false;
    let mut chose_pause = false;
    let mut outcome: Option<Result<(), StreamError>> = None;

    readable.resume().unwrap();
    for _ in 0..MAX_ROUNDS {
        match writable.poll_drive(&mut cx) {
            Poll::Ready(result) => {
                outcome = Some(result);
                break;
            }
            Poll::Pending => {}
        }
        check_bounds!();

        if hold_transform && !writable.needs_drain() {
            hold_transform = false;
            transform.resume().unwrap();
        }
        if !transform_done && !hold_transform {
            let poll = transform.poll_flow(&mut cx, &mut |chunk| match writable.write(chunk) {
                Ok(true) => Flow::Continue,
                _ => {
                    hold_transform = true;
                    Flow::Pause
                }
            });
            match poll {
                Poll::Ready(Ok(())) => transform_done = true,
                Poll::Ready(Err(e)) => {
                    outcome = Some(Err(e));
                    break;
                }
                Poll::Pending => {}
            }
        }
        if transform_done && !writable_ended && !writable.needs_drain() {
            writable.end(None).unwrap();
            writable_ended = true;
        }
        check_bounds!();

        if chose_pause && !hold_readable {
            chose_pause = false;
            readable.resume().unwrap();
        }
        if hold_readable && !transform.needs_drain() {
            hold_readable = false;
            readable.resume().unwrap();
        }
        if !readable_done && !hold_readable && !chose_pause {
            let pauses = &schedule.pauses;
            let poll = readable.poll_flow(&mut cx, &mut |chunk| {
                step += 1;
                match transform.write(chunk) {
                    Ok(true) if pauses[step % pauses.len()] => {
                        chose_pause = true;
                        Flow::Pause
                    }
                    Ok(true) => Flow::Continue,
                    _ => {
                        hold_readable = true;
                        Flow::Pause
                    }
                }
            });
            match poll {
                Poll::Ready(Ok(())) => readable_done = true,
                Poll::Ready(Err(e)) => {
                    outcome = Some(Err(e));
                    break;
                }
                Poll::Pending => {}
            }
        }
        if readable_done && !transform_ended && !transform.needs_drain() {
            transform.end(None).unwrap();
            transform_ended = true;
        }
        check_bounds!();
    }

    let Some(outcome) = outcome else {
        return Err(TestCaseError::fail("schedule made no progress"));
    };
    let delivered = handle.items();

    match outcome {
        Ok(()) => {
            prop_assert_eq!(&delivered, &parts);
            prop_assert_eq!(readable_events.count("end"), 1);
            prop_assert_eq!(transform_events.count("finish"), 1);
            prop_assert_eq!(transform_events.count("end"), 1);
            prop_assert_eq!(writable_events.count("finish"), 1);
            for events in [&readable_events, &transform_events, &writable_events] {
                prop_assert_eq!(events.count("error"), 0);
            }
        }
        Err(err) => {
            prop_assert!(matches!(err, StreamError::Sink(_)));
            prop_assert!(parts.starts_with(&delivered));

            // Same teardown as a failing pipeline.
            readable.destroy(err.clone());
            transform.destroy(err.clone());
            writable.destroy(err);

            prop_assert_eq!(readable_events.count("end") + readable_events.count("error"), 1);
            prop_assert_eq!(
                transform_events.count("finish") + transform_events.count("error"),
                1
            );
            prop_assert!(transform_events.count("end") <= transform_events.count("finish"));
            prop_assert_eq!(writable_events.count("finish"), 0);
            prop_assert_eq!(writable_events.count("error"), 1);
        }
    }
    for events in [&readable_events, &transform_events, &writable_events] {
        prop_assert_eq!(events.count("close"), 1);
    }
    Ok(())
}

// ============================================================================
// Random schedules
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn test_random_schedules_keep_bounds_and_notify_once(
        sizes in prop::collection::vec(1usize..=32, 0..60),
        hwms in (0usize..64, 0usize..64, 0usize..64),
        latency in 0usize..4,
        pauses in prop::collection::vec(any::<bool>(), 1..16),
        fail_at in prop::option::of(0usize..80),
    ) {
        run_schedule(Schedule { sizes, hwms, latency, pauses, fail_at })?;
    }
}

#[test]
fn test_zero_marks_still_complete() {
    run_schedule(Schedule {
        sizes: vec![3, 1, 4, 1, 5],
        hwms: (0, 0, 0),
        latency: 2,
        pauses: vec![false, true],
        fail_at: None,
    })
    .unwrap();
}
