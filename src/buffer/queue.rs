//! FIFO chunk queue with weight accounting.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::config::StreamConfig;
use crate::error::StreamError;

/// Computes the weight of a chunk for high-water mark accounting.
///
/// Byte streams weigh a chunk by its length, object streams count every
/// chunk as 1. Anything else can be supplied with [`Weigher::new`].
pub struct Weigher<T> {
    f: Arc<dyn Fn(&T) -> usize + Send + Sync>,
}

impl<T: 'static> Weigher<T> {
    /// Creates a weigher from a custom function.
    pub fn new(f: impl Fn(&T) -> usize + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Every chunk weighs 1 (object mode).
    pub fn unit() -> Self {
        Self::new(|_| 1)
    }
}

impl<T> Weigher<T> {
    /// Weighs a chunk.
    pub fn weigh(&self, chunk: &T) -> usize {
        (self.f)(chunk)
    }
}

impl<T: AsRef<[u8]> + 'static> Weigher<T> {
    /// Weighs a chunk by its byte length.
    pub fn byte_len() -> Self {
        Self::new(|chunk: &T| chunk.as_ref().len())
    }

    /// Picks the default weigher for a configuration.
    pub fn for_config(config: &StreamConfig) -> Self {
        if config.object_mode() {
            Self::unit()
        } else {
            Self::byte_len()
        }
    }
}

impl<T> Clone for Weigher<T> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<T> fmt::Debug for Weigher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Weigher")
    }
}

/// Ordered queue of pending chunks with a high-water mark.
///
/// `size` is the sum of the weights recorded at enqueue time, so it always
/// matches the queued chunks even if the weigher is not deterministic.
/// `ended` is monotonic: once set, no further chunks are accepted.
///
/// The queue itself is not synchronized. A stage owns its queue exclusively
/// and is driven by one task at a time.
///
/// # Example
///
/// ```
/// use chunkflow::{BufferQueue, Weigher};
///
/// let mut queue = BufferQueue::new(4, Weigher::<Vec<u8>>::byte_len());
/// queue.enqueue(vec![0; 3])?;
/// assert!(!queue.is_above_capacity());
/// queue.enqueue(vec![0; 2])?;
/// assert!(queue.is_above_capacity());
///
/// assert_eq!(queue.dequeue().map(|c| c.len()), Some(3));
/// assert_eq!(queue.size(), 2);
/// # Ok::<(), chunkflow::StreamError>(())
/// ```
#[derive(Debug)]
pub struct BufferQueue<T> {
    items: VecDeque<(T, usize)>,
    size: usize,
    high_water_mark: usize,
    ended: bool,
    weigher: Weigher<T>,
}

impl<T> BufferQueue<T> {
    /// Creates an empty queue.
    pub fn new(high_water_mark: usize, weigher: Weigher<T>) -> Self {
        Self {
            items: VecDeque::new(),
            size: 0,
            high_water_mark,
            ended: false,
            weigher,
        }
    }

    /// Appends a chunk and returns its weight.
    ///
    /// Fails with [`StreamError::State`] once the queue has ended.
    pub fn enqueue(&mut self, chunk: T) -> Result<usize, StreamError> {
        if self.ended {
            return Err(StreamError::State("enqueue after end"));
        }
        let weight = self.weigher.weigh(&chunk);
        self.size += weight;
        self.items.push_back((chunk, weight));
        Ok(weight)
    }

    /// Removes and returns the oldest chunk.
    pub fn dequeue(&mut self) -> Option<T> {
        self.dequeue_weighted().map(|(chunk, _)| chunk)
    }

    /// Removes the oldest chunk and returns it with the weight it was
    /// accounted with.
    pub fn dequeue_weighted(&mut self) -> Option<(T, usize)> {
        let (chunk, weight) = self.items.pop_front()?;
        self.size -= weight;
        Some((chunk, weight))
    }

    /// Returns the oldest chunk without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front().map(|(chunk, _)| chunk)
    }

    /// Marks the queue as ended. Idempotent.
    pub fn mark_ended(&mut self) {
        self.ended = true;
    }

    /// Returns true once no further chunks will be enqueued.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns true when ended and fully drained.
    pub fn is_finished(&self) -> bool {
        self.ended && self.items.is_empty()
    }

    /// `size > high_water_mark`.
    pub fn is_above_capacity(&self) -> bool {
        self.size > self.high_water_mark
    }

    /// `size < high_water_mark`.
    pub fn is_below_mark(&self) -> bool {
        self.size < self.high_water_mark
    }

    /// Total weight of the queued chunks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no chunks are queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the capacity threshold.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Weighs a chunk with this queue's weigher without enqueueing it.
    pub fn weigh(&self, chunk: &T) -> usize {
        self.weigher.weigh(chunk)
    }

    /// Drops every queued chunk and returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.items.len();
        self.items.clear();
        self.size = 0;
        discarded
    }

    /// Recomputes `size` from the queued chunks.
    pub fn recount(&self) -> usize {
        self.items.iter().map(|(_, weight)| weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_queue(hwm: usize) -> BufferQueue<Vec<u8>> {
        BufferQueue::new(hwm, Weigher::byte_len())
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = bytes_queue(16);
        queue.enqueue(b"a".to_vec()).unwrap();
        queue.enqueue(b"bb".to_vec()).unwrap();
        queue.enqueue(b"ccc".to_vec()).unwrap();

        assert_eq!(queue.dequeue().unwrap(), b"a");
        assert_eq!(queue.dequeue().unwrap(), b"bb");
        assert_eq!(queue.dequeue().unwrap(), b"ccc");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_size_accounting() {
        let mut queue = bytes_queue(16);
        assert_eq!(queue.enqueue(vec![0; 5]).unwrap(), 5);
        queue.enqueue(vec![0; 7]).unwrap();
        assert_eq!(queue.size(), 12);
        assert_eq!(queue.size(), queue.recount());

        queue.dequeue();
        assert_eq!(queue.size(), 7);
        assert_eq!(queue.size(), queue.recount());
    }

    #[test]
    fn test_capacity_threshold() {
        let mut queue = bytes_queue(4);
        queue.enqueue(vec![0; 4]).unwrap();
        assert!(!queue.is_above_capacity());
        assert!(!queue.is_below_mark());

        queue.enqueue(vec![0; 1]).unwrap();
        assert!(queue.is_above_capacity());
    }

    #[test]
    fn test_enqueue_after_end_fails() {
        let mut queue = bytes_queue(4);
        queue.mark_ended();
        queue.mark_ended();
        assert!(queue.is_ended());

        let err = queue.enqueue(vec![1]).unwrap_err();
        assert!(matches!(err, StreamError::State(_)));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_dequeue_still_works_after_end() {
        let mut queue = bytes_queue(4);
        queue.enqueue(vec![1, 2]).unwrap();
        queue.mark_ended();
        assert!(!queue.is_finished());
        assert_eq!(queue.dequeue().unwrap(), vec![1, 2]);
        assert!(queue.is_finished());
    }

    #[test]
    fn test_unit_weigher() {
        let mut queue: BufferQueue<&str> = BufferQueue::new(2, Weigher::unit());
        queue.enqueue("a long string").unwrap();
        queue.enqueue("x").unwrap();
        assert_eq!(queue.size(), 2);
        assert!(!queue.is_above_capacity());
    }

    #[test]
    fn test_clear_discards() {
        let mut queue = bytes_queue(4);
        queue.enqueue(vec![0; 3]).unwrap();
        queue.enqueue(vec![0; 3]).unwrap();
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_for_config_object_mode() {
        let config = StreamConfig::objects();
        let weigher = Weigher::<Vec<u8>>::for_config(&config);
        assert_eq!(weigher.weigh(&vec![0; 100]), 1);

        let weigher = Weigher::<Vec<u8>>::for_config(&StreamConfig::default());
        assert_eq!(weigher.weigh(&vec![0; 100]), 100);
    }
}
