//! In-process queue backend for local operation and tests.
//!
//! Delivers over an unbounded channel, retries with exponential backoff up to
//! a bounded attempt count. Not durable; a real deployment points the worker
//! at an external at-least-once queue instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{JobConsumer, JobDelivery, JobQueue, QueueError};

struct QueueInner {
    tx: mpsc::UnboundedSender<JobDelivery>,
    max_attempts: i32,
    base_backoff: Duration,
}

impl QueueInner {
    fn delivery(&self, run_id: Uuid, attempt_number: i32) -> JobDelivery {
        JobDelivery {
            run_id,
            attempt_number,
            is_last_attempt: attempt_number >= self.max_attempts,
        }
    }

    fn send(&self, delivery: JobDelivery) -> Result<(), QueueError> {
        self.tx.send(delivery).map_err(|_| QueueError::Closed)
    }
}

#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<QueueInner>,
}

pub struct InMemoryConsumer {
    rx: mpsc::UnboundedReceiver<JobDelivery>,
    inner: Arc<QueueInner>,
}

impl InMemoryQueue {
    /// Build a queue/consumer pair. `max_attempts` bounds deliveries per run;
    /// retry n waits `base_backoff * 2^(n-1)`.
    pub fn channel(max_attempts: i32, base_backoff: Duration) -> (Self, InMemoryConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(QueueInner {
            tx,
            max_attempts,
            base_backoff,
        });
        (
            Self {
                inner: inner.clone(),
            },
            InMemoryConsumer { rx, inner },
        )
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, run_id: Uuid) -> Result<(), QueueError> {
        let delivery = self.inner.delivery(run_id, 1);
        debug!(%run_id, "enqueued investigation run");
        self.inner.send(delivery)
    }
}

#[async_trait]
impl JobConsumer for InMemoryConsumer {
    async fn next_delivery(&mut self) -> Option<JobDelivery> {
        self.rx.recv().await
    }

    async fn retry_later(&self, delivery: &JobDelivery) -> Result<(), QueueError> {
        if delivery.is_last_attempt {
            warn!(run_id = %delivery.run_id, "no attempts remaining, dropping delivery");
            return Ok(());
        }
        let next = self
            .inner
            .delivery(delivery.run_id, delivery.attempt_number + 1);
        let backoff = self.inner.base_backoff * 2u32.pow(delivery.attempt_number as u32 - 1);
        let inner = self.inner.clone();
        debug!(
            run_id = %next.run_id,
            attempt = next.attempt_number,
            backoff_ms = backoff.as_millis() as u64,
            "scheduling retry"
        );
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            if inner.send(next).is_err() {
                warn!(run_id = %next.run_id, "queue closed before retry could be delivered");
            }
        });
        Ok(())
    }

    async fn redeliver(&self, delivery: &JobDelivery) -> Result<(), QueueError> {
        self.inner.send(*delivery)
    }
}
