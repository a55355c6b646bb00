//! Benchmarks for chunkflow.
//!
//! Run with:
//!     cargo bench

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use bytes::Bytes;
use chunkflow::{
    CollectSink, IterSource, LineSplitter, Pipeline, Readable, StreamConfig, Transform, Writable,
};

fn parts(size: usize, chunk: usize) -> Vec<Bytes> {
    let data: Vec<u8> = (0..size).map(|i| (i * 7 + 13) as u8).collect();
    data.chunks(chunk).map(Bytes::copy_from_slice).collect()
}

fn copy(parts: Vec<Bytes>, config: StreamConfig) -> u64 {
    let (sink, _) = CollectSink::new();
    let pipeline = Pipeline::new(
        Readable::new(IterSource::new(parts), config),
        Writable::new(sink, config),
    );
    tokio_test::block_on(pipeline).unwrap().weight
}

fn bench_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy");
    let size = 1024 * 1024; // 1 MB

    group.throughput(Throughput::Bytes(size as u64));
    for chunk in [512, 8 * 1024, 64 * 1024] {
        let data = parts(size, chunk);
        group.bench_function(format!("chunks_{}b", chunk), |b| {
            b.iter(|| black_box(copy(data.clone(), StreamConfig::default())))
        });
    }

    // Tiny high-water mark: every write engages backpressure
    let data = parts(size, 8 * 1024);
    group.bench_function("hwm_1", |b| {
        b.iter(|| black_box(copy(data.clone(), StreamConfig::new(1).unwrap())))
    });

    group.finish();
}

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("transforms");
    let lines: Vec<Bytes> = (0..10_000)
        .map(|i| Bytes::from(format!("line number {}\n", i)))
        .collect();
    let size: usize = lines.iter().map(Bytes::len).sum();

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("pass_through_x3", |b| {
        b.iter(|| {
            let (sink, _) = CollectSink::new();
            let pipeline = Pipeline::builder(Readable::new(
                IterSource::new(lines.clone()),
                StreamConfig::default(),
            ))
            .through(Transform::pass_through(StreamConfig::default()))
            .through(Transform::pass_through(StreamConfig::default()))
            .through(Transform::pass_through(StreamConfig::default()))
            .into_sink(Writable::new(sink, StreamConfig::default()));
            black_box(tokio_test::block_on(pipeline).unwrap().chunks)
        })
    });

    group.bench_function("line_splitter", |b| {
        b.iter(|| {
            let (sink, _) = CollectSink::new();
            let pipeline = Pipeline::builder(Readable::new(
                IterSource::new(lines.clone()),
                StreamConfig::default(),
            ))
            .through(Transform::new(LineSplitter::new(), StreamConfig::default()))
            .into_sink(Writable::new(sink, StreamConfig::default()));
            black_box(tokio_test::block_on(pipeline).unwrap().chunks)
        })
    });

    group.finish();
}

#[cfg(feature = "hash-blake3")]
fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");
    let size = 1024 * 1024; // 1 MB
    let data = parts(size, 16 * 1024);

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("blake3", |b| {
        b.iter(|| {
            let (sink, _) = CollectSink::new();
            let pipeline = Pipeline::builder(Readable::new(
                IterSource::new(data.clone()),
                StreamConfig::default(),
            ))
            .with_digest()
            .into_sink(Writable::new(sink, StreamConfig::default()));
            black_box(tokio_test::block_on(pipeline).unwrap().digest)
        })
    });

    group.finish();
}

#[cfg(not(feature = "hash-blake3"))]
fn bench_digest(_c: &mut Criterion) {}

criterion_group!(benches, bench_copy, bench_transforms, bench_digest);
criterion_main!(benches);
