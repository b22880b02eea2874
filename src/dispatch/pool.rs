//! Worker pool: a fixed set of tasks draining the outbound queue.
//!
//! Each worker loops: dequeue → send with a timeout → log failures and move
//! on. There is no retry; a job that fails after dequeue is gone. The worker
//! count caps concurrent calls to the gateway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::job::OutboundJob;
use super::queue::BoundedQueue;
use crate::error::GatewayError;
use crate::gateway::OutboundSender;
use crate::status::{JobStatus, JobTracker};

/// Default per-send deadline.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Shared dependencies handed to every worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<BoundedQueue<OutboundJob>>,
    pub sender: Arc<dyn OutboundSender>,
    pub tracker: Option<Arc<JobTracker>>,
    pub send_timeout: Duration,
}

/// A fixed number of long-lived send workers.
pub struct WorkerPool {
    deps: WorkerDeps,
    size: usize,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(deps: WorkerDeps, size: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            deps,
            size: size.max(1),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn the workers. Calling this on a running pool does nothing.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Worker pool already started");
            return;
        }
        if *self.shutdown_tx.borrow() {
            warn!("Worker pool already stopped, not restarting");
            return;
        }

        for id in 1..=self.size {
            let deps = self.deps.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker_loop(id, deps, shutdown_rx)));
        }

        info!(workers = self.size, "Worker pool started");
    }

    /// Signal every worker to stop pulling jobs and wait for them to return.
    ///
    /// Sends already in flight run to completion (bounded by the send
    /// timeout). Safe to call more than once.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().await);
        if handles.is_empty() {
            return;
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        info!("Worker pool stopped");
    }

    /// Number of workers currently running.
    pub async fn running(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }
}

async fn worker_loop(id: usize, deps: WorkerDeps, mut shutdown_rx: watch::Receiver<bool>) {
    debug!(worker = id, "Outbox worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            job = deps.queue.dequeue() => job,
        };

        let Some(job) = job else {
            debug!(worker = id, "Queue closed and drained");
            break;
        };

        process_job(id, &deps, job).await;
    }

    info!(worker = id, "Outbox worker exiting");
}

async fn process_job(id: usize, deps: &WorkerDeps, job: OutboundJob) {
    let request = job.to_request();
    let result = tokio::time::timeout(deps.send_timeout, deps.sender.send(request))
        .await
        .unwrap_or(Err(GatewayError::Timeout(deps.send_timeout)));

    match result {
        Ok(message_id) => {
            info!(
                worker = id,
                phone = %job.phone,
                conversation_id = %job.conversation_id,
                message_id = ?message_id,
                "Reply sent"
            );
            if let (Some(tracker), Some(message_id)) = (&deps.tracker, message_id) {
                tracker
                    .upsert_status(
                        &message_id,
                        JobStatus::Submitted.as_str(),
                        &job.phone,
                        &job.conversation_id,
                    )
                    .await;
            }
        }
        Err(e) => {
            warn!(
                worker = id,
                phone = %job.phone,
                conversation_id = %job.conversation_id,
                error = %e,
                "Failed to send reply, dropping job"
            );
        }
    }
}
