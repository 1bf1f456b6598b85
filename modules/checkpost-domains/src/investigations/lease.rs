//! Exclusive run ownership: atomic claim, detached heartbeat, stale recovery.
//!
//! A lease is `(lease_owner, lease_expires_at)`. Claiming is one conditional
//! update, so concurrent workers racing for the same run need no in-process
//! coordination; at most one of them sees a row come back.

use std::time::Duration;

use sqlx::{PgConnection, PgPool};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::InvestigateError;
use crate::investigations::models::{InvestigationRun, InvestigationStatus};

/// Result of a claim attempt.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This worker now owns the lease.
    Claimed(InvestigationRun),
    /// The run row is gone; a stale job reference, not an error.
    Missing,
    /// The investigation is already complete or failed.
    Terminal,
    /// Another worker actively owns the lease. Back off.
    LeaseHeld,
}

/// Atomically claim a run. Succeeds iff the investigation is pending or
/// processing and the lease is absent or expired; the lease check applies in
/// both states so racing claimers on a fresh pending run cannot both win.
pub async fn claim_run(
    run_id: Uuid,
    worker_id: &str,
    ttl_secs: u64,
    pool: &PgPool,
) -> Result<ClaimOutcome, InvestigateError> {
    let claimed = sqlx::query_as::<_, InvestigationRun>(
        r#"
        UPDATE investigation_runs AS r
        SET lease_owner = $2,
            lease_expires_at = now() + ($3 * interval '1 second'),
            started_at = now(),
            heartbeat_at = now()
        FROM investigations i
        WHERE r.id = $1
          AND i.id = r.investigation_id
          AND i.status IN ('pending', 'processing')
          AND (r.lease_owner IS NULL OR r.lease_expires_at <= now())
        RETURNING r.*
        "#,
    )
    .bind(run_id)
    .bind(worker_id)
    .bind(ttl_secs as i64)
    .fetch_optional(pool)
    .await?;

    if let Some(run) = claimed {
        debug!(%run_id, worker_id, "claimed run lease");
        return Ok(ClaimOutcome::Claimed(run));
    }

    // Zero rows: distinguish why without racing the winner.
    let status = sqlx::query_as::<_, (InvestigationStatus,)>(
        r#"
        SELECT i.status FROM investigation_runs r
        JOIN investigations i ON i.id = r.investigation_id
        WHERE r.id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    match status {
        None => Ok(ClaimOutcome::Missing),
        Some((InvestigationStatus::Complete,)) | Some((InvestigationStatus::Failed,)) => {
            Ok(ClaimOutcome::Terminal)
        }
        Some(_) => Ok(ClaimOutcome::LeaseHeld),
    }
}

/// Detached heartbeat task handle. Aborts the timer on drop so it can never
/// outlive the job it belongs to.
pub struct HeartbeatGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Extend the lease on a period of TTL/4 while the job runs.
///
/// Conditioned on still owning the lease and the investigation still being
/// in processing; failures are logged and ignored, never surfaced into the
/// main flow. The task stops on its own once the condition no longer holds.
pub fn spawn_heartbeat(
    pool: PgPool,
    run_id: Uuid,
    worker_id: String,
    ttl_secs: u64,
    period: Duration,
) -> HeartbeatGuard {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the claim just set the lease.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let result = sqlx::query(
                r#"
                UPDATE investigation_runs AS r
                SET lease_expires_at = now() + ($3 * interval '1 second'),
                    heartbeat_at = now()
                FROM investigations i
                WHERE r.id = $1
                  AND i.id = r.investigation_id
                  AND r.lease_owner = $2
                  AND i.status = 'processing'
                "#,
            )
            .bind(run_id)
            .bind(&worker_id)
            .bind(ttl_secs as i64)
            .execute(&pool)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => {
                    debug!(%run_id, "lease no longer held, stopping heartbeat");
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(%run_id, %error, "heartbeat update failed");
                }
            }
        }
    });
    HeartbeatGuard { handle }
}

/// Reclaim a run observed stuck in processing with an expired/absent lease.
///
/// One transaction re-checks the lease is still recoverable (the true owner
/// may have completed in the meantime) before nulling the lease and resetting
/// the investigation to pending. Exactly one of N concurrent recovery
/// attempts returns true; the rest observe zero affected rows.
pub async fn recover_stale_run(run_id: Uuid, pool: &PgPool) -> Result<bool, InvestigateError> {
    let mut tx = pool.begin().await?;

    let reset = sqlx::query(
        r#"
        UPDATE investigation_runs AS r
        SET lease_owner = NULL,
            lease_expires_at = NULL,
            recover_after_at = NULL,
            heartbeat_at = NULL
        FROM investigations i
        WHERE r.id = $1
          AND i.id = r.investigation_id
          AND i.status = 'processing'
          AND (r.lease_owner IS NULL OR r.lease_expires_at <= now())
        "#,
    )
    .bind(run_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if reset == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let rearmed = sqlx::query(
        r#"
        UPDATE investigations AS i
        SET status = 'pending', updated_at = now()
        FROM investigation_runs r
        WHERE r.id = $1 AND i.id = r.investigation_id AND i.status = 'processing'
        "#,
    )
    .bind(run_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(rearmed > 0)
}

/// Clear lease ownership inside the caller's transaction. Conditioned on the
/// owner so an expired-and-reclaimed lease is never clobbered.
pub(crate) async fn release_lease(
    run_id: Uuid,
    worker_id: &str,
    conn: &mut PgConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE investigation_runs
        SET lease_owner = NULL, lease_expires_at = NULL, recover_after_at = NULL
        WHERE id = $1 AND lease_owner = $2
        "#,
    )
    .bind(run_id)
    .bind(worker_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Release the lease but schedule a recovery window: the run stays in
/// processing so the queue's own retry (not a second enqueue) picks it up.
pub(crate) async fn release_lease_for_retry(
    run_id: Uuid,
    worker_id: &str,
    recover_after_secs: u64,
    conn: &mut PgConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE investigation_runs
        SET lease_owner = NULL,
            lease_expires_at = NULL,
            recover_after_at = now() + ($3 * interval '1 second')
        WHERE id = $1 AND lease_owner = $2
        "#,
    )
    .bind(run_id)
    .bind(worker_id)
    .bind(recover_after_secs as i64)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

