use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use checkpost_queue::JobQueue;

use crate::config::AppConfig;
use crate::investigator::{CanonicalFetcher, ImageLoader, Investigator};

/// Central dependency container passed to all activities and the orchestrator.
///
/// Built once at startup; nothing here is lazily initialized behind a
/// module-level check.
#[derive(Clone)]
pub struct WorkerDeps {
    pub db_pool: PgPool,
    pub investigator: Arc<dyn Investigator>,
    pub canonical_fetcher: Arc<dyn CanonicalFetcher>,
    pub image_loader: Arc<dyn ImageLoader>,
    pub queue: Arc<dyn JobQueue>,
    pub config: AppConfig,
    /// Identity written into lease ownership, unique per worker process.
    pub worker_id: String,
}

impl WorkerDeps {
    pub fn new(
        db_pool: PgPool,
        investigator: Arc<dyn Investigator>,
        canonical_fetcher: Arc<dyn CanonicalFetcher>,
        image_loader: Arc<dyn ImageLoader>,
        queue: Arc<dyn JobQueue>,
        config: AppConfig,
    ) -> Self {
        Self {
            db_pool,
            investigator,
            canonical_fetcher,
            image_loader,
            queue,
            config,
            worker_id: worker_identity(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}

/// `hostname-uuid`, unique per process so expired leases are attributable.
pub fn worker_identity() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    format!("{host}-{}", Uuid::new_v4())
}
