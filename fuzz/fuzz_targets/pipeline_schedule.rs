#![no_main]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use chunkflow::{
    Blake3Hasher, CollectSink, Flow, IterSource, Pipeline, Readable, StreamConfig, Transform,
    Writable,
};
use libfuzzer_sys::fuzz_target;

/// Splits `payload` into chunks whose sizes come from `sizes`.
fn split(payload: &[u8], sizes: &[u8]) -> Vec<Bytes> {
    let mut parts = Vec::new();
    let mut rest = payload;
    let mut i = 0;
    while !rest.is_empty() {
        let n = (sizes.get(i % sizes.len().max(1)).copied().unwrap_or(7) as usize % 64 + 1)
            .min(rest.len());
        parts.push(Bytes::copy_from_slice(&rest[..n]));
        rest = &rest[n..];
        i += 1;
    }
    parts
}

/// Counts one kind of lifecycle notification.
fn counter() -> (Arc<AtomicUsize>, impl FnOnce(&()) + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move |_: &()| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fn error_counter() -> (Arc<AtomicUsize>, impl FnOnce(&chunkflow::StreamError) + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move |_: &chunkflow::StreamError| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let (knobs, payload) = data.split_at(4);
    let parts = split(payload, knobs);

    // Verify: every byte arrives, in order, through a backpressured chain
    let (sink, handle) = CollectSink::<Bytes>::new();
    let mut readable = Readable::new(
        IterSource::new(parts.clone()),
        StreamConfig::new(knobs[0] as usize).unwrap(),
    );
    let mut transform: Transform<Bytes, Bytes> =
        Transform::pass_through(StreamConfig::new(knobs[1] as usize).unwrap());
    let mut writable = Writable::new(
        sink.with_latency(knobs[3] as usize % 4),
        StreamConfig::new(knobs[2] as usize).unwrap(),
    );

    let (source_ends, on_end) = counter();
    readable.on_end(on_end);
    let (source_errors, on_error) = error_counter();
    readable.on_error(on_error);
    let (transform_finishes, on_finish) = counter();
    transform.on_finish(on_finish);
    let (transform_ends, on_end) = counter();
    transform.on_end(on_end);
    let (transform_errors, on_error) = error_counter();
    transform.on_error(on_error);
    let (sink_finishes, on_finish) = counter();
    writable.on_finish(on_finish);
    let (sink_errors, on_error) = error_counter();
    writable.on_error(on_error);

    let mut pipeline = Pipeline::builder(readable)
        .through(transform)
        .with_digest()
        .into_sink(writable);

    let mut cx = Context::from_waker(Waker::noop());
    let report = loop {
        if let Poll::Ready(result) = Pin::new(&mut pipeline).poll(&mut cx) {
            break result.unwrap();
        }
    };

    let delivered: Vec<u8> = handle.items().concat();
    assert_eq!(delivered, payload);
    assert_eq!(report.weight, payload.len() as u64);
    assert_eq!(report.chunks, parts.len() as u64);
    assert_eq!(report.violations, 0);
    let mut expected = Blake3Hasher::new();
    expected.update(payload);
    assert_eq!(report.digest, Some(expected.finalize()));

    // Verify: every terminal notification fired exactly once
    for count in [&source_ends, &transform_finishes, &transform_ends, &sink_finishes] {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
    for count in [&source_errors, &transform_errors, &sink_errors] {
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    // Verify: random pauses in flowing mode never drop or reorder chunks
    let mut readable = Readable::new(IterSource::new(parts.clone()), StreamConfig::new(8).unwrap());
    let mut seen = Vec::new();
    let mut step = 0usize;
    readable.resume().unwrap();
    loop {
        let poll = readable.poll_flow(&mut cx, &mut |chunk: Bytes| {
            seen.push(chunk);
            step += 1;
            if payload.get(step).is_some_and(|b| b % 3 == 0) {
                Flow::Pause
            } else {
                Flow::Continue
            }
        });
        match poll {
            Poll::Ready(result) => break result.unwrap(),
            Poll::Pending if readable.is_paused() => readable.resume().unwrap(),
            Poll::Pending => {}
        }
    }
    assert_eq!(seen, parts);
});
