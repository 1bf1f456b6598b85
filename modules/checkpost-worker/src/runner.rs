//! Queue consumption loop: one delivery in, one orchestrator call out.

use std::time::Duration;

use tracing::{debug, error, info};

use checkpost_core::WorkerDeps;
use checkpost_domains::investigations::{process_run, RunOutcome};
use checkpost_domains::InvestigateError;
use checkpost_queue::JobConsumer;

/// Back off briefly before putting a lease-held delivery back on the queue.
const LEASE_HELD_BACKOFF: Duration = Duration::from_millis(250);

pub async fn run_worker<C: JobConsumer>(deps: WorkerDeps, mut consumer: C) -> anyhow::Result<()> {
    while let Some(delivery) = consumer.next_delivery().await {
        debug!(
            run_id = %delivery.run_id,
            attempt = delivery.attempt_number,
            "processing delivery"
        );

        match process_run(delivery.run_id, &delivery, &deps).await {
            Ok(RunOutcome::Completed { claim_count }) => {
                info!(run_id = %delivery.run_id, claim_count, "run completed");
            }
            // Terminal failure and quiet skips were already logged where
            // they were decided.
            Ok(RunOutcome::Failed) | Ok(RunOutcome::Skipped) => {}
            Ok(RunOutcome::LeaseHeld) => {
                tokio::time::sleep(LEASE_HELD_BACKOFF).await;
                if consumer.redeliver(&delivery).await.is_err() {
                    break;
                }
            }
            Err(InvestigateError::Transient(cause)) => {
                debug!(run_id = %delivery.run_id, %cause, "scheduling queue retry");
                if consumer.retry_later(&delivery).await.is_err() {
                    break;
                }
            }
            Err(failure) => {
                error!(run_id = %delivery.run_id, %failure, "run processing failed");
                if !delivery.is_last_attempt && consumer.retry_later(&delivery).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("queue drained, worker stopping");
    Ok(())
}
