//! Top-level driver for one queued investigation run.
//!
//! Claims the lease, loads context, invokes the investigator, and commits
//! the outcome in a single transaction. Failures are classified before they
//! are persisted or propagated.

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use checkpost_core::{
    AttemptAudit, InvestigateRequest, InvestigatorOutput, PlatformContext, ProviderError,
    WorkerDeps,
};
use checkpost_queue::JobDelivery;

use crate::content::models::{ContentBlob, ImageOccurrenceSet, Post, PostVersion};
use crate::content::occurrences::ImageOccurrence;
use crate::error::InvestigateError;
use crate::investigations::classify::{classify, ErrorClass};
use crate::investigations::interleave::interleave_content;
use crate::investigations::lease::{
    claim_run, release_lease, release_lease_for_retry, spawn_heartbeat, ClaimOutcome,
};
use crate::investigations::models::{
    AttemptOutcome, Claim, Investigation, InvestigationAttempt, InvestigationStatus,
};

/// How a delivery ended, as seen by the queue consumer.
#[derive(Debug)]
pub enum RunOutcome {
    /// Claims committed, investigation complete.
    Completed { claim_count: usize },
    /// Terminal failure persisted.
    Failed,
    /// Another worker owns the lease; back off, no state changed.
    LeaseHeld,
    /// The run is gone or already terminal; nothing to do.
    Skipped,
}

/// Process one delivery of a run.
///
/// A transient failure comes back as `Err(InvestigateError::Transient)` after
/// the lease is released, so the queue's own backoff drives the retry; the
/// investigation status is deliberately left in processing to keep a second
/// independent enqueue from racing that retry.
pub async fn process_run(
    run_id: Uuid,
    delivery: &JobDelivery,
    deps: &WorkerDeps,
) -> Result<RunOutcome, InvestigateError> {
    let pool = deps.pool();

    let run = match claim_run(run_id, &deps.worker_id, deps.config.lease_ttl_secs, pool).await? {
        ClaimOutcome::Claimed(run) => run,
        ClaimOutcome::Missing => {
            info!(%run_id, "run no longer exists, skipping");
            return Ok(RunOutcome::Skipped);
        }
        ClaimOutcome::Terminal => {
            info!(%run_id, "investigation already terminal, skipping");
            return Ok(RunOutcome::Skipped);
        }
        ClaimOutcome::LeaseHeld => {
            debug!(%run_id, "lease held elsewhere, backing off");
            return Ok(RunOutcome::LeaseHeld);
        }
    };

    let investigation = Investigation::find_by_id(run.investigation_id, pool)
        .await?
        .ok_or_else(|| {
            InvestigateError::InternalConsistency(format!(
                "investigation {} missing right after claim",
                run.investigation_id
            ))
        })?;

    if investigation.status == InvestigationStatus::Pending {
        Investigation::set_processing(investigation.id, pool).await?;
    }

    let _heartbeat = spawn_heartbeat(
        pool.clone(),
        run.id,
        deps.worker_id.clone(),
        deps.config.lease_ttl_secs,
        deps.config.heartbeat_period(),
    );

    // Context rows were written by the resolver before this run could be
    // queued; their absence after a successful claim is a consistency fault,
    // not a benign skip.
    let post = Post::find_by_id(investigation.post_id, pool)
        .await?
        .ok_or_else(|| {
            InvestigateError::InternalConsistency(format!(
                "post {} missing for claimed investigation",
                investigation.post_id
            ))
        })?;
    let blob = ContentBlob::find_by_hash(&investigation.content_hash, pool)
        .await?
        .ok_or_else(|| {
            InvestigateError::InternalConsistency(format!(
                "content blob {} missing for claimed investigation",
                investigation.content_hash
            ))
        })?;

    let occurrences = load_occurrences(&investigation, pool).await?;
    let interleaved = interleave_content(
        &blob.content_text,
        &occurrences,
        deps.image_loader.as_ref(),
        deps.config.max_images_per_request,
    )
    .await;

    let request_summary = json!({
        "prompt_id": investigation.prompt_id,
        "attempt_number": delivery.attempt_number,
        "content_hash": investigation.content_hash,
        "images": {
            "resolved": interleaved.resolved,
            "reused": interleaved.reused,
            "omitted": interleaved.omitted,
            "missing": interleaved.missing,
        },
    });

    let request = InvestigateRequest {
        investigation_id: investigation.id,
        prompt_id: investigation.prompt_id.clone(),
        parts: interleaved.parts,
        context: PlatformContext {
            platform: post.platform,
            external_id: post.external_id.clone(),
            author_handle: post.author_handle.clone(),
            source_url: post.source_url.clone(),
        },
    };

    let result = match tokio::time::timeout(
        deps.config.investigate_timeout(),
        deps.investigator.investigate(request),
    )
    .await
    {
        Ok(result) => result,
        Err(_elapsed) => Err(anyhow::Error::new(ProviderError::Timeout(
            deps.config.investigate_timeout(),
        ))),
    };

    match result {
        Ok(output) => finish_success(&investigation, run.id, delivery, output, deps).await,
        Err(error) => {
            finish_failure(&investigation, run.id, delivery, request_summary, error, deps).await
        }
    }
}

async fn load_occurrences(
    investigation: &Investigation,
    pool: &sqlx::PgPool,
) -> Result<Vec<ImageOccurrence>, InvestigateError> {
    let version =
        PostVersion::find_latest_for_content(investigation.post_id, &investigation.content_hash, pool)
            .await?;
    let Some(version) = version else {
        return Ok(Vec::new());
    };
    let set = ImageOccurrenceSet::find_by_id(version.image_occurrence_set_id, pool).await?;
    Ok(set.map(|s| s.occurrences.0).unwrap_or_default())
}

/// One transaction: attempt audit, claim replacement, completion, lease
/// release.
async fn finish_success(
    investigation: &Investigation,
    run_id: Uuid,
    delivery: &JobDelivery,
    output: InvestigatorOutput,
    deps: &WorkerDeps,
) -> Result<RunOutcome, InvestigateError> {
    let mut tx = deps.pool().begin().await?;

    InvestigationAttempt::record(
        investigation.id,
        delivery.attempt_number,
        AttemptOutcome::Succeeded,
        &output.audit,
        None,
        None,
        &mut *tx,
    )
    .await?;

    let claim_count =
        Claim::replace_for_investigation(investigation.id, &output.claims, &mut tx).await?;

    let completed = sqlx::query(
        r#"
        UPDATE investigations
        SET status = 'complete', checked_at = now(), model_version = $2, updated_at = now()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(investigation.id)
    .bind(output.audit.model_version.as_deref())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if completed == 0 {
        // Someone else finished the row while we ran. Benign; drop the
        // transaction rather than clobbering their result.
        warn!(
            investigation_id = %investigation.id,
            "investigation no longer processing at commit, discarding result"
        );
        tx.rollback().await?;
        return Ok(RunOutcome::Skipped);
    }

    release_lease(run_id, &deps.worker_id, &mut tx).await?;
    tx.commit().await?;

    info!(
        investigation_id = %investigation.id,
        claim_count,
        "investigation complete"
    );
    Ok(RunOutcome::Completed { claim_count })
}

/// Classify, audit, and either finalize as failed or release for the queue's
/// retry.
async fn finish_failure(
    investigation: &Investigation,
    run_id: Uuid,
    delivery: &JobDelivery,
    request_summary: serde_json::Value,
    error: anyhow::Error,
    deps: &WorkerDeps,
) -> Result<RunOutcome, InvestigateError> {
    let class = classify(&error);
    let terminal = class == ErrorClass::NonRetryable || delivery.is_last_attempt;

    let audit = AttemptAudit {
        request: request_summary,
        ..AttemptAudit::default()
    };

    let message = format!("{error:#}");
    let mut tx = deps.pool().begin().await?;
    InvestigationAttempt::record(
        investigation.id,
        delivery.attempt_number,
        AttemptOutcome::Failed,
        &audit,
        Some(class.as_str()),
        Some(message.as_str()),
        &mut *tx,
    )
    .await?;

    if terminal {
        let failed = sqlx::query(
            r#"
            UPDATE investigations
            SET status = 'failed', updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(investigation.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        release_lease(run_id, &deps.worker_id, &mut tx).await?;
        tx.commit().await?;

        if failed == 0 {
            warn!(
                investigation_id = %investigation.id,
                "investigation no longer processing at failure commit"
            );
            return Ok(RunOutcome::Skipped);
        }

        warn!(
            investigation_id = %investigation.id,
            attempt = delivery.attempt_number,
            class = class.as_str(),
            last_attempt = delivery.is_last_attempt,
            error = %error,
            "investigation failed terminally"
        );
        Ok(RunOutcome::Failed)
    } else {
        // Transient with attempts remaining: release the lease, keep the
        // status, and hand the error back so the queue's backoff retries.
        release_lease_for_retry(
            run_id,
            &deps.worker_id,
            deps.config.recover_after_secs,
            &mut tx,
        )
        .await?;
        tx.commit().await?;

        warn!(
            investigation_id = %investigation.id,
            attempt = delivery.attempt_number,
            error = %error,
            "transient failure, leaving run for queue retry"
        );
        Err(InvestigateError::Transient(error))
    }
}
