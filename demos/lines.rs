//! Line splitting example.
//!
//! Streams a file through a line splitter into an in-memory sink, with a
//! small high-water mark so backpressure engages on every few lines.
//!
//! Run with:
//!     cargo run --example lines -- /path/to/file

use std::env;

use bytes::Bytes;
use chunkflow::{CollectSink, LineSplitter, Pipeline, Readable, StreamConfig, Transform, Writable};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| "Cargo.toml".to_string());

    let data = std::fs::read(&path)?;
    println!("Splitting {} ({} bytes)\n", path, data.len());

    // Feed the file in 64-byte pieces so lines straddle chunk boundaries
    let pieces: Vec<Bytes> = data.chunks(64).map(Bytes::copy_from_slice).collect();

    let config = StreamConfig::new(256)?;
    let (sink, lines) = CollectSink::new();
    let report = Pipeline::builder(Readable::from_items(pieces, config))
        .through(Transform::new(LineSplitter::new(), config))
        .into_sink(Writable::new(sink, config))
        .await?;

    for (n, line) in lines.items().iter().enumerate().take(10) {
        println!("{:>4}: {}", n + 1, String::from_utf8_lossy(line));
    }

    println!(
        "\nTotal: {} lines, {} bytes of text, {} drains",
        report.chunks, report.weight, report.drains
    );
    Ok(())
}
