//! Lazily-connected queue handle.
//!
//! Wraps a queue client behind the resource pool so the connection is opened
//! on first enqueue and shared by every caller afterwards.

use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::{JobQueue, QueueError};
use crate::pool::{PoolError, ResourceFactory, ResourcePool};

pub struct PooledQueue<F: ResourceFactory> {
    pool: ResourcePool<F>,
}

impl<F> PooledQueue<F>
where
    F: ResourceFactory,
    F::Resource: JobQueue,
{
    pub fn new(factory: F) -> Self {
        Self {
            pool: ResourcePool::new(factory),
        }
    }

    /// Release the underlying client. Idempotent.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        self.pool.close().await
    }
}

#[async_trait]
impl<F> JobQueue for PooledQueue<F>
where
    F: ResourceFactory,
    F::Resource: JobQueue,
{
    async fn enqueue(&self, run_id: Uuid) -> Result<(), QueueError> {
        let queue = self.pool.acquire().await.map_err(QueueError::from)?;
        queue.enqueue(run_id).await
    }
}
