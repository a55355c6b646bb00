// Integration tests for individual stages
// Tests cover: pull-mode streams, send and drain, converters inside pipelines, config, buffer accounting, duplex I/O

use bytes::Bytes;
use chunkflow::{
    BufferQueue, CollectSink, Encoding, Flow, LineSplitter, Pipeline, Readable, ReadableState,
    Signal, StreamConfig, StreamError, StreamSource, TextDecoder, Transform, TransformState,
    Weigher, Writable,
};
use futures_util::StreamExt;

// ============================================================================
// Readable
// ============================================================================

#[tokio::test]
async fn test_readable_as_stream() {
    let mut readable = Readable::from_items(["x", "y", "z"], StreamConfig::objects());

    let mut seen = Vec::new();
    while let Some(chunk) = readable.next().await {
        seen.push(chunk.unwrap());
    }
    assert_eq!(seen, ["x", "y", "z"]);
    assert_eq!(readable.state(), ReadableState::Ended);
    assert!(readable.next().await.is_none());
}

#[tokio::test]
async fn test_stream_error_is_yielded_once() {
    let items = futures_util::stream::iter(vec![
        Ok(1u8),
        Err(std::io::Error::other("reset by peer")),
    ]);
    let readable = Readable::objects(StreamSource::new(items), StreamConfig::new(1).unwrap());

    let results: Vec<_> = readable.collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(*results[0].as_ref().unwrap(), 1);
    assert!(matches!(results[1], Err(StreamError::Source(_))));
}

#[tokio::test]
async fn test_flow_pause_then_resume() {
    let mut readable = Readable::from_items(0..6u32, StreamConfig::objects());
    let mut first = Vec::new();
    readable.resume().unwrap();

    // Pausing leaves the flow pending, so bound it with a single poll.
    let paused = futures_util::poll!(Box::pin(readable.flow(|n| {
        first.push(n);
        if n == 2 { Flow::Pause } else { Flow::Continue }
    })));
    assert!(paused.is_pending());
    assert_eq!(first, [0, 1, 2]);
    assert_eq!(readable.state(), ReadableState::Paused);

    let mut rest = Vec::new();
    readable.resume().unwrap();
    readable
        .flow(|n| {
            rest.push(n);
            Flow::Continue
        })
        .await
        .unwrap();
    assert_eq!(rest, [3, 4, 5]);
}

// ============================================================================
// Writable
// ============================================================================

#[test]
fn test_send_waits_for_drain() {
    use tokio_test::{assert_pending, assert_ready_ok, task};

    let (sink, handle) = CollectSink::new();
    let mut writable = Writable::new(sink.with_latency(1), StreamConfig::new(2).unwrap());

    let mut send = task::spawn(writable.send(b"abc".to_vec()));
    // The sink holds the chunk for one poll, so no drain yet.
    assert_pending!(send.poll());
    assert!(send.is_woken());
    assert_ready_ok!(send.poll());
    drop(send);

    assert_eq!(writable.drains(), 1);
    assert_eq!(writable.buffered(), 0);
    assert_eq!(handle.items(), [b"abc".to_vec()]);
}

// ============================================================================
// Converters in pipelines
// ============================================================================

#[tokio::test]
async fn test_lines_across_chunk_boundaries() {
    let parts = ["alpha\nbe", "ta\r\n", "", "gam", "ma\ndelta"];
    let (sink, handle) = CollectSink::new();

    Pipeline::builder(Readable::from_items(parts, StreamConfig::default()))
        .through(Transform::new(LineSplitter::new(), StreamConfig::new(4).unwrap()))
        .into_sink(Writable::new(sink, StreamConfig::new(4).unwrap()))
        .await
        .unwrap();

    assert_eq!(handle.items(), ["alpha", "beta", "gamma", "delta"]);
}

#[tokio::test]
async fn test_utf8_split_between_chunks() {
    let text = "naïve café ☕";
    let bytes = text.as_bytes();
    // Split inside 'ï' and inside '☕'.
    let parts: Vec<Bytes> = vec![
        Bytes::copy_from_slice(&bytes[..3]),
        Bytes::copy_from_slice(&bytes[3..14]),
        Bytes::copy_from_slice(&bytes[14..]),
    ];
    let config = StreamConfig::default().with_encoding("utf-8".parse().unwrap());
    let (sink, handle) = CollectSink::new();

    Pipeline::builder(Readable::from_items(parts, config))
        .through(Transform::new(TextDecoder::from_config(&config), config))
        .into_sink(Writable::new(sink, config))
        .await
        .unwrap();

    assert_eq!(handle.items().concat(), text);
}

#[tokio::test]
async fn test_hex_decoder() {
    let (sink, handle) = CollectSink::new();
    let source = Readable::from_items([vec![0xde_u8, 0xad], vec![0xbe, 0xef]], StreamConfig::default());

    Pipeline::builder(source)
        .through(Transform::new(TextDecoder::new(Encoding::Hex), StreamConfig::default()))
        .into_sink(Writable::new(sink, StreamConfig::default()))
        .await
        .unwrap();

    assert_eq!(handle.items(), ["dead", "beef"]);
}

#[tokio::test]
async fn test_transform_listeners_fire_in_order() {
    use std::sync::{Arc, Mutex};

    let events = Arc::new(Mutex::new(Vec::new()));
    let mut upper = Transform::map(StreamConfig::default(), |s: String| s.to_uppercase());
    let log = events.clone();
    upper.on_data(move |chunk: &String| log.lock().unwrap().push(chunk.clone()));
    let log = events.clone();
    upper.on_finish(move |_| log.lock().unwrap().push("finish".to_string()));
    let log = events.clone();
    upper.on_end(move |_| log.lock().unwrap().push("end".to_string()));

    upper.write("ab".to_string()).unwrap();
    upper.end(Some("cd".to_string())).unwrap();

    let mut out = Vec::new();
    upper
        .flow(|chunk| {
            out.push(chunk);
            Flow::Continue
        })
        .await
        .unwrap();

    assert_eq!(out, ["AB", "CD"]);
    assert_eq!(upper.state(), TransformState::Ended);
    // finish: all input converted and flushed; end: all output consumed.
    assert_eq!(*events.lock().unwrap(), ["finish", "AB", "CD", "end"]);
}

// ============================================================================
// Configuration and Buffers
// ============================================================================

#[test]
fn test_config_defaults_and_validation() {
    use chunkflow::{DEFAULT_HIGH_WATER_MARK, DEFAULT_OBJECT_HIGH_WATER_MARK, MAX_HIGH_WATER_MARK};

    assert_eq!(StreamConfig::default().high_water_mark(), DEFAULT_HIGH_WATER_MARK);
    assert_eq!(StreamConfig::objects().high_water_mark(), DEFAULT_OBJECT_HIGH_WATER_MARK);
    assert!(StreamConfig::new(0).is_ok());
    assert!(matches!(
        StreamConfig::new(MAX_HIGH_WATER_MARK + 1),
        Err(StreamError::InvalidConfig { .. })
    ));
    assert_eq!("BINARY".parse::<Encoding>().unwrap(), Encoding::Latin1);
    assert!("ebcdic".parse::<Encoding>().is_err());
}

#[test]
fn test_buffer_queue_weights() {
    let mut queue = BufferQueue::new(5, Weigher::byte_len());
    queue.enqueue(Bytes::from_static(b"abc")).unwrap();
    assert!(queue.is_below_mark());
    queue.enqueue(Bytes::from_static(b"defg")).unwrap();
    assert!(queue.is_above_capacity());
    assert_eq!(queue.size(), 7);

    assert_eq!(queue.dequeue().unwrap(), "abc");
    assert_eq!(queue.size(), 4);

    queue.mark_ended();
    assert!(matches!(
        queue.enqueue(Bytes::from_static(b"h")),
        Err(StreamError::State(_))
    ));
    assert_eq!(queue.dequeue().unwrap(), "defg");
    assert!(queue.is_finished());
}

#[test]
fn test_one_shot_signal() {
    let mut signal: Signal<u32> = Signal::one_shot();
    let (tx, rx) = std::sync::mpsc::channel();
    signal.on(move |n| tx.send(*n).unwrap());

    assert!(signal.emit(&7));
    assert!(!signal.emit(&8));
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), [7]);
    assert!(signal.has_fired());
}

// ============================================================================
// Duplex
// ============================================================================

#[cfg(feature = "async-io")]
#[tokio::test]
async fn test_duplex_over_socket_pair() {
    use chunkflow::{Chunk, Duplex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_util::compat::TokioAsyncReadCompatExt;

    let (local, mut remote) = tokio::io::duplex(64);
    let peer = tokio::spawn(async move {
        let mut request = [0u8; 4];
        remote.read_exact(&mut request).await.unwrap();
        remote.write_all(b"pong").await.unwrap();
        remote.shutdown().await.unwrap();
        request
    });

    let mut duplex: Duplex<Bytes, Chunk> = Duplex::from_io(local.compat(), StreamConfig::default());
    assert!(duplex.writable().write(Bytes::from_static(b"ping")).unwrap());
    // Closing the write half leaves the read half open.
    duplex.writable().finish().await.unwrap();

    let mut reply = Vec::new();
    while let Some(chunk) = duplex.readable().next().await {
        reply.extend_from_slice(chunk.unwrap().as_ref());
    }
    assert_eq!(reply, b"pong");
    assert_eq!(&peer.await.unwrap(), b"ping");
}
