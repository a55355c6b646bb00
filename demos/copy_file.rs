//! File copy example.
//!
//! Copies a file through a backpressured pipeline and prints the BLAKE3
//! digest of the bytes written.
//!
//! Run with:
//!     cargo run --example copy_file -- <source> <destination>

use std::env;

use chunkflow::{Pipeline, Readable, ReaderSource, StreamConfig, Writable, WriterSink};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let (Some(from), Some(to)) = (args.next(), args.next()) else {
        eprintln!("usage: copy_file <source> <destination>");
        std::process::exit(2);
    };

    let reader = tokio::fs::File::open(&from).await?;
    let writer = tokio::fs::File::create(&to).await?;

    // 64 KiB reads, at most 256 KiB buffered on either side
    let config = StreamConfig::new(256 * 1024)?;
    let source = ReaderSource::with_read_size(reader.compat(), 64 * 1024);
    let sink = WriterSink::new(writer.compat_write());

    let report = Pipeline::builder(Readable::new(source, config))
        .with_digest()
        .into_sink(Writable::new(sink, config))
        .await?;

    println!("Copied {} -> {}", from, to);
    println!(
        "{} bytes in {} chunks, {} drains, {:?}",
        report.weight, report.chunks, report.drains, report.elapsed
    );
    if let Some(digest) = report.digest {
        println!("blake3: {}", digest);
    }
    Ok(())
}
