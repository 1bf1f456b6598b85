#![allow(dead_code)]
//! Shared fixtures for the Postgres-backed suites.
//!
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are
//! skipped. Tests use unique content per case instead of truncating, so the
//! suites can run concurrently against one database.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use checkpost_core::{
    AppConfig, AttemptAudit, CanonicalFetcher, ClaimOutput, FetchFailure, ImageBlob, ImageLoader,
    InvestigateRequest, Investigator, InvestigatorOutput, Platform, PromptSpec, ProviderError,
    WorkerDeps,
};
use checkpost_domains::content::resolver::{RawSubmission, ResolvedIdentity};
use checkpost_domains::resolve_content_identity;
use checkpost_queue::{JobQueue, QueueError};

pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    checkpost_domains::migrate(&pool).await.ok()?;
    Some(pool)
}

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        anthropic_api_key: None,
        investigation_model: "test-model".into(),
        prompt_id: "fact-check-v1".into(),
        max_content_words: 10_000,
        lease_ttl_secs: 60,
        recover_after_secs: 30,
        canonical_fetch_timeout_secs: 5,
        investigate_timeout_secs: 30,
        conflict_retry_attempts: 30,
        conflict_retry_delay_ms: 20,
        max_images_per_request: 8,
        max_image_bytes: 5 * 1024 * 1024,
        queue_max_attempts: 5,
        queue_base_backoff_ms: 10,
    }
}

pub fn prompt() -> PromptSpec {
    PromptSpec {
        prompt_id: "fact-check-v1".into(),
        provider: "anthropic".into(),
        model: "test-model".into(),
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Canonical fetcher returning a fixed text, or failing when none is set.
pub struct FakeFetcher {
    pub canonical: Option<String>,
}

#[async_trait]
impl CanonicalFetcher for FakeFetcher {
    async fn fetch(&self, _platform: Platform, _external_id: &str) -> Result<String, FetchFailure> {
        match &self.canonical {
            Some(text) => Ok(text.clone()),
            None => Err(FetchFailure::Status(503)),
        }
    }
}

/// Image loader with nothing to offer.
pub struct NoImages;

#[async_trait]
impl ImageLoader for NoImages {
    async fn load(&self, _source_url: &str) -> anyhow::Result<Option<ImageBlob>> {
        Ok(None)
    }
}

/// One scripted investigator response per invocation, in order.
pub enum Script {
    Claims(Vec<ClaimOutput>),
    Http(u16),
    Schema,
}

pub struct ScriptedInvestigator {
    script: Mutex<VecDeque<Script>>,
}

impl ScriptedInvestigator {
    pub fn new(steps: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
        }
    }
}

#[async_trait]
impl Investigator for ScriptedInvestigator {
    async fn investigate(&self, _request: InvestigateRequest) -> anyhow::Result<InvestigatorOutput> {
        let step = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("script exhausted");
        match step {
            Script::Claims(claims) => Ok(InvestigatorOutput {
                claims,
                audit: AttemptAudit {
                    request: serde_json::json!({"scripted": true}),
                    model_version: Some("test-model-1".into()),
                    ..AttemptAudit::default()
                },
            }),
            Script::Http(status) => Err(ProviderError::Http {
                status,
                message: "scripted failure".into(),
            }
            .into()),
            Script::Schema => Err(ProviderError::SchemaValidation("scripted".into()).into()),
        }
    }
}

/// Queue that records enqueued run ids instead of delivering them.
#[derive(Default)]
pub struct RecordingQueue {
    pub enqueued: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, run_id: Uuid) -> Result<(), QueueError> {
        self.enqueued.lock().expect("queue lock").push(run_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deps assembly
// ---------------------------------------------------------------------------

pub fn make_deps(
    pool: PgPool,
    canonical: Option<String>,
    script: Vec<Script>,
) -> (WorkerDeps, Arc<RecordingQueue>) {
    let queue = Arc::new(RecordingQueue::default());
    let config = test_config("postgres://unused");
    let deps = WorkerDeps::new(
        pool,
        Arc::new(ScriptedInvestigator::new(script)),
        Arc::new(FakeFetcher { canonical }),
        Arc::new(NoImages),
        queue.clone(),
        config,
    );
    (deps, queue)
}

/// A submission with unique content so tests never collide.
pub fn unique_submission(label: &str) -> RawSubmission {
    let nonce = Uuid::new_v4();
    RawSubmission {
        platform: Platform::Web,
        external_id: format!("https://posts.example.com/{label}/{nonce}"),
        author_handle: Some("author".into()),
        source_url: None,
        submitted_text: format!("{label} content {nonce} with several words in it"),
        observed_occurrences: vec![],
    }
}

pub async fn resolve(deps: &WorkerDeps, submission: &RawSubmission) -> ResolvedIdentity {
    resolve_content_identity(submission.clone(), deps)
        .await
        .expect("resolve identity")
}
