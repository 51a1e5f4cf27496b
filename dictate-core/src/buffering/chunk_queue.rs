//! Bounded, drop-oldest-on-full channel bridging the blocking recorder
//! thread to the async capture service.
//!
//! The recorder thread must never block on a full sink — it has real audio
//! hardware to service. `ChunkSink::push` therefore never waits: when the
//! queue is at capacity it evicts the oldest chunk, increments a drop
//! counter, and pushes the new one. The async side wakes via `tokio::sync`
//! `Notify` rather than polling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::chunk::AudioChunk;

struct Inner {
    queue: Mutex<VecDeque<AudioChunk>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

/// Producer half — held by the blocking recorder thread.
#[derive(Clone)]
pub struct ChunkSink(Arc<Inner>);

/// Consumer half — held by the async capture service.
pub struct ChunkSource(Arc<Inner>);

/// Construct a bounded channel with drop-oldest overflow behavior.
pub struct ChunkQueue;

impl ChunkQueue {
    pub fn bounded(capacity: usize) -> (ChunkSink, ChunkSource) {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        });
        (ChunkSink(inner.clone()), ChunkSource(inner))
    }
}

impl ChunkSink {
    /// Push a chunk. Never blocks; drops the oldest queued chunk if full.
    pub fn push(&self, chunk: AudioChunk) {
        let mut queue = self.0.queue.lock();
        if queue.len() >= self.0.capacity {
            queue.pop_front();
            self.0.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(chunk);
        drop(queue);
        self.0.notify.notify_one();
    }

    /// Signal the consumer that no more chunks are coming. Idempotent.
    pub fn close(&self) {
        self.0.closed.store(true, Ordering::Release);
        self.0.notify.notify_waiters();
    }

    /// Chunks evicted so far due to a full queue.
    pub fn dropped_count(&self) -> u64 {
        self.0.dropped.load(Ordering::Relaxed)
    }
}

impl ChunkSource {
    /// Await the next chunk. Returns `None` once the sink has closed and the
    /// queue has drained.
    ///
    /// The waiter is registered with `notify` *before* the queue/closed check
    /// below, not after: `close()` calls `notify_waiters()`, which (unlike
    /// `notify_one()`) stores no permit for a future waiter, so checking
    /// `closed` first and only then awaiting `notified()` can miss a `close()`
    /// that lands in between and park forever.
    pub async fn recv(&self) -> Option<AudioChunk> {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(chunk) = self.0.queue.lock().pop_front() {
                return Some(chunk);
            }
            if self.0.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.0.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: usize) -> AudioChunk {
        AudioChunk::new(vec![n as f32], 16_000)
    }

    #[tokio::test]
    async fn recv_returns_chunks_in_order() {
        let (sink, source) = ChunkQueue::bounded(4);
        sink.push(chunk(1));
        sink.push(chunk(2));
        assert_eq!(source.recv().await.unwrap().samples, vec![1.0]);
        assert_eq!(source.recv().await.unwrap().samples, vec![2.0]);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let (sink, source) = ChunkQueue::bounded(2);
        sink.push(chunk(1));
        sink.push(chunk(2));
        sink.push(chunk(3)); // evicts chunk(1)
        assert_eq!(sink.dropped_count(), 1);
        assert_eq!(source.recv().await.unwrap().samples, vec![2.0]);
        assert_eq!(source.recv().await.unwrap().samples, vec![3.0]);
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_and_drain() {
        let (sink, source) = ChunkQueue::bounded(4);
        sink.push(chunk(1));
        sink.close();
        assert_eq!(source.recv().await.unwrap().samples, vec![1.0]);
        assert!(source.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_waits_for_a_push_then_wakes() {
        let (sink, source) = ChunkQueue::bounded(4);
        let handle = tokio::spawn(async move { source.recv().await });
        tokio::task::yield_now().await;
        sink.push(chunk(42));
        let received = handle.await.unwrap();
        assert_eq!(received.unwrap().samples, vec![42.0]);
    }

    #[tokio::test]
    async fn recv_already_parked_on_an_empty_queue_wakes_on_close() {
        // Regression: `close()` uses `notify_waiters()`, which wakes only
        // waiters already registered — it stores no permit like
        // `notify_one()` does. A `recv()` parked on an empty queue before
        // `close()` runs must still observe it instead of hanging forever.
        let (sink, source) = ChunkQueue::bounded(4);
        let handle = tokio::spawn(async move { source.recv().await });
        tokio::task::yield_now().await;
        sink.close();
        let received = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("recv should wake on close, not hang")
            .unwrap();
        assert!(received.is_none());
    }
}
