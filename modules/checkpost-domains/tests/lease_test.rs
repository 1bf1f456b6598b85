//! Lease claim, heartbeat, and stale-run recovery against Postgres.
//!
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are
//! skipped.

mod support;

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use checkpost_domains::investigations::lease::{
    claim_run, recover_stale_run, spawn_heartbeat, ClaimOutcome,
};
use checkpost_domains::investigations::models::{Investigation, InvestigationRun};
use checkpost_domains::investigations::queueing::ensure_investigation_queued;
use checkpost_domains::QueueOptions;

use support::*;

async fn setup_run(pool: &PgPool, label: &str) -> (Investigation, InvestigationRun) {
    let (deps, _) = make_deps(pool.clone(), None, vec![]);
    let identity = resolve(&deps, &unique_submission(label)).await;
    let investigation =
        ensure_investigation_queued(&identity, &prompt(), &QueueOptions::default(), &deps)
            .await
            .expect("ensure queued");
    let run = InvestigationRun::find_by_investigation(investigation.id, pool)
        .await
        .unwrap()
        .expect("run exists");
    (investigation, run)
}

#[tokio::test]
async fn ten_concurrent_claims_yield_exactly_one_winner() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (_, run) = setup_run(&pool, "mutex").await;

    let attempts: Vec<_> = (0..10)
        .map(|i| {
            let pool = pool.clone();
            let run_id = run.id;
            tokio::spawn(async move {
                claim_run(run_id, &format!("worker-{i}"), 60, &pool).await
            })
        })
        .collect();

    let mut claimed = 0;
    let mut contended = 0;
    for attempt in attempts {
        match attempt.await.unwrap().unwrap() {
            ClaimOutcome::Claimed(_) => claimed += 1,
            ClaimOutcome::LeaseHeld | ClaimOutcome::Terminal => contended += 1,
            ClaimOutcome::Missing => panic!("run should exist"),
        }
    }
    assert_eq!(claimed, 1);
    assert_eq!(contended, 9);
}

#[tokio::test]
async fn expired_lease_is_reclaimable() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (investigation, run) = setup_run(&pool, "reclaim").await;

    // Worker A claims with a zero TTL, then vanishes.
    let first = claim_run(run.id, "worker-a", 0, &pool).await.unwrap();
    assert!(matches!(first, ClaimOutcome::Claimed(_)));
    Investigation::set_processing(investigation.id, &pool)
        .await
        .unwrap();

    let second = claim_run(run.id, "worker-b", 60, &pool).await.unwrap();
    match second {
        ClaimOutcome::Claimed(reclaimed) => {
            assert_eq!(reclaimed.lease_owner.as_deref(), Some("worker-b"));
        }
        other => panic!("expected reclaim, got {other:?}"),
    }
}

#[tokio::test]
async fn claim_on_terminal_investigation_reports_terminal() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (investigation, run) = setup_run(&pool, "terminal").await;
    sqlx::query("UPDATE investigations SET status = 'complete' WHERE id = $1")
        .bind(investigation.id)
        .execute(&pool)
        .await
        .unwrap();

    let outcome = claim_run(run.id, "worker-a", 60, &pool).await.unwrap();
    assert!(matches!(outcome, ClaimOutcome::Terminal));
}

#[tokio::test]
async fn claim_on_unknown_run_reports_missing() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let outcome = claim_run(Uuid::new_v4(), "worker-a", 60, &pool)
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::Missing));
}

#[tokio::test]
async fn exactly_one_concurrent_recovery_wins() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (investigation, run) = setup_run(&pool, "recovery").await;

    // A worker died holding the lease: processing, expired a second ago.
    sqlx::query("UPDATE investigations SET status = 'processing' WHERE id = $1")
        .bind(investigation.id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "UPDATE investigation_runs SET lease_owner = 'worker-dead', lease_expires_at = now() - interval '1 second' WHERE id = $1",
    )
    .bind(run.id)
    .execute(&pool)
    .await
    .unwrap();

    let attempts: Vec<_> = (0..5)
        .map(|_| {
            let pool = pool.clone();
            let run_id = run.id;
            tokio::spawn(async move { recover_stale_run(run_id, &pool).await })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        if attempt.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let recovered = Investigation::find_by_id(investigation.id, &pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        recovered.status,
        checkpost_domains::InvestigationStatus::Pending
    );
    let run = InvestigationRun::find_by_id(run.id, &pool).await.unwrap().unwrap();
    assert!(run.lease_owner.is_none());
    assert!(run.lease_expires_at.is_none());
}

#[tokio::test]
async fn recovery_does_not_race_a_live_owner() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (investigation, run) = setup_run(&pool, "live-owner").await;

    let claimed = claim_run(run.id, "worker-live", 60, &pool).await.unwrap();
    assert!(matches!(claimed, ClaimOutcome::Claimed(_)));
    Investigation::set_processing(investigation.id, &pool)
        .await
        .unwrap();

    // The lease is healthy, so recovery must refuse.
    assert!(!recover_stale_run(run.id, &pool).await.unwrap());
    let run = InvestigationRun::find_by_id(run.id, &pool).await.unwrap().unwrap();
    assert_eq!(run.lease_owner.as_deref(), Some("worker-live"));
}

#[tokio::test]
async fn heartbeat_extends_the_lease_until_dropped() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (investigation, run) = setup_run(&pool, "heartbeat").await;

    let claimed = claim_run(run.id, "worker-hb", 2, &pool).await.unwrap();
    assert!(matches!(claimed, ClaimOutcome::Claimed(_)));
    Investigation::set_processing(investigation.id, &pool)
        .await
        .unwrap();

    let before = InvestigationRun::find_by_id(run.id, &pool)
        .await
        .unwrap()
        .unwrap()
        .lease_expires_at
        .unwrap();

    let guard = spawn_heartbeat(
        pool.clone(),
        run.id,
        "worker-hb".into(),
        2,
        Duration::from_millis(100),
    );
    tokio::time::sleep(Duration::from_millis(350)).await;

    let during = InvestigationRun::find_by_id(run.id, &pool)
        .await
        .unwrap()
        .unwrap()
        .lease_expires_at
        .unwrap();
    assert!(during > before, "heartbeat should extend the lease");

    drop(guard);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after_drop = InvestigationRun::find_by_id(run.id, &pool)
        .await
        .unwrap()
        .unwrap()
        .lease_expires_at
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = InvestigationRun::find_by_id(run.id, &pool)
        .await
        .unwrap()
        .unwrap()
        .lease_expires_at
        .unwrap();
    assert_eq!(after_drop, later, "dropped heartbeat must stop extending");
}
