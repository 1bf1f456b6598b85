use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use checkpost_core::fetchers::{http_client, HttpCanonicalFetcher, HttpImageLoader};
use checkpost_core::{AppConfig, UrlValidator, WorkerDeps};
use checkpost_queue::memory::InMemoryQueue;
use checkpost_worker::investigator::ClaudeInvestigator;
use checkpost_worker::runner;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("checkpost=info".parse()?))
        .init();

    info!("Checkpost worker starting...");

    let config = AppConfig::from_env()?;
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    // Run migrations (idempotent)
    checkpost_domains::migrate(&pool).await?;

    let validator = UrlValidator::new();
    let http = http_client(config.canonical_fetch_timeout())?;
    let canonical_fetcher = Arc::new(HttpCanonicalFetcher::new(http.clone(), validator.clone()));
    let image_loader = Arc::new(HttpImageLoader::new(
        http,
        validator,
        config.max_image_bytes,
    ));

    let api_key = config
        .anthropic_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY is required to run the worker"))?;
    let investigator = Arc::new(ClaudeInvestigator::new(
        api_key,
        config.investigation_model.clone(),
    ));

    // Submission intake (the public API) enqueues through the same queue
    // handle held in the deps; this process consumes the other end.
    let (queue, consumer) =
        InMemoryQueue::channel(config.queue_max_attempts, config.queue_base_backoff());

    let deps = WorkerDeps::new(
        pool,
        investigator,
        canonical_fetcher,
        image_loader,
        Arc::new(queue),
        config,
    );

    info!(worker_id = %deps.worker_id, "worker ready, consuming deliveries");
    runner::run_worker(deps, consumer).await
}
