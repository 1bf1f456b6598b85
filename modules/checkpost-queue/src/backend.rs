//! Job queue collaborator contract.
//!
//! The queue guarantees at-least-once delivery with its own retry backoff and
//! tells the worker, per delivery, which attempt this is and whether it is the
//! last one the queue will make.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::pool::PoolError;

/// One delivery of an investigation run to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDelivery {
    pub run_id: Uuid,
    /// 1-based attempt counter maintained by the queue.
    pub attempt_number: i32,
    /// True when the queue will not retry this run again.
    pub is_last_attempt: bool,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,

    #[error("job queue backend error: {0}")]
    Backend(String),
}

impl From<PoolError> for QueueError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Closed => QueueError::Closed,
            other => QueueError::Backend(other.to_string()),
        }
    }
}

/// Producer side: schedule an investigation run for processing.
///
/// `enqueue` is fire-and-forget; delivery, retry, and backoff are the
/// backend's concern.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, run_id: Uuid) -> Result<(), QueueError>;
}

/// Consumer side of a queue backend.
#[async_trait]
pub trait JobConsumer: Send {
    /// Next delivery, or `None` once the queue is closed and drained.
    async fn next_delivery(&mut self) -> Option<JobDelivery>;

    /// Schedule the next attempt of a failed delivery after backoff.
    async fn retry_later(&self, delivery: &JobDelivery) -> Result<(), QueueError>;

    /// Put the same attempt back on the queue without consuming a retry
    /// (used when another worker holds the lease).
    async fn redeliver(&self, delivery: &JobDelivery) -> Result<(), QueueError>;
}
