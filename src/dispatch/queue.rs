//! Bounded FIFO queue shared by request handlers (producers) and send workers (consumers).
//!
//! `enqueue` never blocks: once the queue holds `capacity` items the newest
//! arrival is dropped and counted. `dequeue` parks the caller until an item
//! arrives or the queue is closed and drained.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tracing::warn;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity, drop-newest FIFO queue.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item. Returns `false` and drops the item when the queue is
    /// full or closed.
    pub fn enqueue(&self, item: T) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                drop(inner);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "Queue closed, dropping item");
                return false;
            }
            if inner.items.len() >= self.capacity {
                drop(inner);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(capacity = self.capacity, dropped, "Queue full, dropping newest item");
                return false;
            }
            inner.items.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next item. Returns `None` only once the queue is closed
    /// and every remaining item has been taken.
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            // Registered before the check so a concurrent enqueue/close cannot be missed.
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    let more = !inner.items.is_empty();
                    drop(inner);
                    if more {
                        // Pass the wakeup on so another idle consumer picks up the rest.
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the next item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Refuse further enqueues and wake every waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of items rejected since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn dequeue_preserves_submission_order() {
        let queue = BoundedQueue::new(10);
        for i in 0..10 {
            assert!(queue.enqueue(i));
        }
        for i in 0..10 {
            assert_eq!(queue.dequeue().await, Some(i));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn overflow_drops_newest_and_queue_keeps_working() {
        let queue = BoundedQueue::new(2);
        assert!(queue.enqueue("a"));
        assert!(queue.enqueue("b"));
        assert!(!queue.enqueue("c"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);

        assert_eq!(queue.dequeue().await, Some("a"));
        assert!(queue.enqueue("d"));
        assert_eq!(queue.dequeue().await, Some("b"));
        assert_eq!(queue.dequeue().await, Some("d"));
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.enqueue(1));
        assert!(!queue.enqueue(2));
    }

    #[tokio::test]
    async fn dequeue_waits_for_enqueue() {
        let queue = Arc::new(BoundedQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.enqueue(42);
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(42));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = BoundedQueue::new(4);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.close();

        assert!(queue.is_closed());
        assert!(!queue.enqueue(3));
        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, Some(2));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn close_wakes_all_waiting_consumers() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        for consumer in consumers {
            let got = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, None);
        }
    }

    #[tokio::test]
    async fn concurrent_producers_respect_capacity() {
        let queue = Arc::new(BoundedQueue::new(50));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut accepted = 0;
                    for i in 0..25 {
                        if queue.enqueue(p * 100 + i) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let mut accepted = 0;
        for producer in producers {
            accepted += producer.await.unwrap();
        }

        assert_eq!(accepted, 50);
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.dropped(), 50);
    }

    #[tokio::test]
    async fn try_dequeue_does_not_wait() {
        let queue = BoundedQueue::new(1);
        assert_eq!(queue.try_dequeue(), None::<u8>);
        queue.enqueue(5);
        assert_eq!(queue.try_dequeue(), Some(5));
    }
}
