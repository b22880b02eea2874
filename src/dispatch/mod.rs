//! Outbound reply dispatch: bounded queue, worker pool and the outbox facade.

pub mod job;
pub mod outbox;
pub mod pool;
pub mod queue;

pub use job::OutboundJob;
pub use outbox::{Outbox, OutboxConfig};
pub use pool::{WorkerDeps, WorkerPool};
pub use queue::BoundedQueue;
