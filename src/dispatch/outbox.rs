//! Outbox: the bounded queue plus the worker pool that drains it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::job::OutboundJob;
use super::pool::{WorkerDeps, WorkerPool};
use super::queue::BoundedQueue;
use crate::gateway::OutboundSender;
use crate::status::JobTracker;

/// Default number of jobs the outbox will hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default number of send workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Sizing for an [`Outbox`].
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout: super::pool::DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Fire-and-forget reply dispatch.
pub struct Outbox {
    queue: Arc<BoundedQueue<OutboundJob>>,
    pool: WorkerPool,
}

impl Outbox {
    pub fn new(
        config: OutboxConfig,
        sender: Arc<dyn OutboundSender>,
        tracker: Option<Arc<JobTracker>>,
    ) -> Self {
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let deps = WorkerDeps {
            queue: Arc::clone(&queue),
            sender,
            tracker,
            send_timeout: config.send_timeout,
        };
        Self {
            pool: WorkerPool::new(deps, config.workers),
            queue,
        }
    }

    /// Queue a reply for delivery. Returns `false` if it was dropped
    /// because the outbox is full or shut down.
    pub fn enqueue_reply(&self, phone: &str, conversation_id: &str, text: &str) -> bool {
        let accepted = self
            .queue
            .enqueue(OutboundJob::new(phone, conversation_id, text));
        if !accepted {
            warn!(phone = %phone, conversation_id = %conversation_id, "Outbox rejected reply");
        }
        accepted
    }

    pub async fn start(&self) {
        self.pool.start().await;
    }

    /// Close the queue to new replies, stop the workers and wait for
    /// in-flight sends. Jobs still queued are abandoned.
    pub async fn stop(&self) {
        self.queue.close();
        self.pool.stop().await;

        let mut abandoned = 0usize;
        while self.queue.try_dequeue().is_some() {
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "Outbox stopped with undelivered replies");
        }
        info!("Outbox stopped");
    }

    /// Jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Replies rejected since startup.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }
}
