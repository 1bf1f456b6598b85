//! Idempotent get-or-create of the job-bearing records, word-limit gating,
//! and enqueue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use checkpost_core::{PromptSpec, WorkerDeps};

use crate::content::resolver::ResolvedIdentity;
use crate::error::InvestigateError;
use crate::investigations::lease::recover_stale_run;
use crate::investigations::models::{Investigation, InvestigationRun, InvestigationStatus};

/// Injectable hook run just before enqueue (e.g. attach a per-run credential
/// override).
#[async_trait]
pub trait PreEnqueueHook: Send + Sync {
    async fn before_enqueue(
        &self,
        investigation: &Investigation,
        run: &InvestigationRun,
    ) -> anyhow::Result<()>;
}

#[derive(Default, Clone)]
pub struct QueueOptions {
    /// Re-arm a failed investigation to pending. Complete is never mutated.
    pub requeue_failed: bool,
    pub pre_enqueue: Option<Arc<dyn PreEnqueueHook>>,
}

/// Ensure exactly one investigation exists for the resolved identity and that
/// its run is on the queue when it should be.
///
/// The word-limit gate applies only at first creation: content over the limit
/// fails before any row exists, but an existing investigation is never
/// retroactively rejected.
pub async fn ensure_investigation_queued(
    identity: &ResolvedIdentity,
    prompt: &PromptSpec,
    options: &QueueOptions,
    deps: &WorkerDeps,
) -> Result<Investigation, InvestigateError> {
    let pool = deps.pool();

    let mut investigation =
        match Investigation::find_by_identity(identity.post_id, &identity.content_hash, pool)
            .await?
        {
            Some(existing) => existing,
            None => {
                if identity.word_count > deps.config.max_content_words {
                    return Err(InvestigateError::WordLimitExceeded {
                        word_count: identity.word_count,
                        limit: deps.config.max_content_words,
                    });
                }
                match Investigation::insert_if_absent(
                    identity.post_id,
                    &identity.content_hash,
                    prompt,
                    pool,
                )
                .await?
                {
                    Some(created) => created,
                    // Lost the creation race; wait for the winner's row.
                    None => {
                        wait_for_investigation(identity.post_id, &identity.content_hash, deps)
                            .await?
                    }
                }
            }
        };

    let run = match InvestigationRun::find_by_investigation(investigation.id, pool).await? {
        Some(run) => run,
        None => match InvestigationRun::insert_if_absent(investigation.id, pool).await? {
            Some(run) => run,
            None => InvestigationRun::find_by_investigation(investigation.id, pool)
                .await?
                .ok_or_else(|| {
                    InvestigateError::InternalConsistency(format!(
                        "run for investigation {} vanished after conflict",
                        investigation.id
                    ))
                })?,
        },
    };

    match investigation.status {
        InvestigationStatus::Complete => return Ok(investigation),
        InvestigationStatus::Processing => {
            if run.lease_recoverable(chrono::Utc::now()) {
                if recover_stale_run(run.id, pool).await? {
                    info!(run_id = %run.id, "recovered stale run");
                    investigation = refresh(&investigation, deps).await?;
                }
            }
            if investigation.status != InvestigationStatus::Pending {
                debug!(
                    investigation_id = %investigation.id,
                    "investigation busy, nothing to enqueue"
                );
                return Ok(investigation);
            }
        }
        InvestigationStatus::Failed => {
            if !options.requeue_failed {
                return Ok(investigation);
            }
            if Investigation::requeue_failed(investigation.id, pool).await? {
                info!(investigation_id = %investigation.id, "re-armed failed investigation");
                investigation = refresh(&investigation, deps).await?;
            }
            if investigation.status != InvestigationStatus::Pending {
                return Ok(investigation);
            }
        }
        InvestigationStatus::Pending => {}
    }

    if let Some(hook) = &options.pre_enqueue {
        hook.before_enqueue(&investigation, &run)
            .await
            .map_err(InvestigateError::PreEnqueue)?;
    }

    deps.queue.enqueue(run.id).await?;
    InvestigationRun::mark_queued(run.id, pool).await?;
    info!(
        investigation_id = %investigation.id,
        run_id = %run.id,
        "investigation queued"
    );

    Ok(investigation)
}

async fn refresh(
    investigation: &Investigation,
    deps: &WorkerDeps,
) -> Result<Investigation, InvestigateError> {
    Investigation::find_by_id(investigation.id, deps.pool())
        .await?
        .ok_or_else(|| {
            InvestigateError::InternalConsistency(format!(
                "investigation {} vanished mid-queueing",
                investigation.id
            ))
        })
}

/// Bounded re-read after losing a unique-constraint race.
async fn wait_for_investigation(
    post_id: uuid::Uuid,
    content_hash: &str,
    deps: &WorkerDeps,
) -> Result<Investigation, InvestigateError> {
    for _ in 0..deps.config.conflict_retry_attempts {
        if let Some(found) =
            Investigation::find_by_identity(post_id, content_hash, deps.pool()).await?
        {
            return Ok(found);
        }
        tokio::time::sleep(deps.config.conflict_retry_delay()).await;
    }
    Err(InvestigateError::InternalConsistency(format!(
        "investigation for post {post_id} never became visible after conflict"
    )))
}
