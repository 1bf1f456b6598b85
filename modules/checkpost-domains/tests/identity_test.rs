//! Content identity resolution against Postgres.
//!
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are
//! skipped.

mod support;

use checkpost_domains::content::models::post_version::ContentProvenance;
use checkpost_domains::content::models::PostVersion;
use checkpost_domains::content::occurrences::ImageOccurrence;
use checkpost_domains::error::{IdentityError, OccurrenceError};
use checkpost_domains::resolve_content_identity;

use support::*;

#[tokio::test]
async fn byte_identical_content_resolves_to_one_blob() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (deps, _) = make_deps(pool, None, vec![]);
    let submission = unique_submission("idempotent");

    let first = resolve(&deps, &submission).await;
    let second = resolve(&deps, &submission).await;

    assert_eq!(first.content_blob_id, second.content_blob_id);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(first.post_version_id, second.post_version_id);

    // Re-observation bumps bookkeeping instead of inserting.
    let version = PostVersion::find_by_key(first.post_id, &first.version_hash, deps.pool())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.seen_count, 2);
}

#[tokio::test]
async fn failed_fetch_yields_client_fallback_with_reason() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (deps, _) = make_deps(pool, None, vec![]);
    let identity = resolve(&deps, &unique_submission("fallback")).await;

    assert_eq!(identity.provenance, ContentProvenance::ClientFallback);
    let version = PostVersion::find_by_key(identity.post_id, &identity.version_hash, deps.pool())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.fetch_failure_reason.as_deref(), Some("http_status"));
    assert!(version.server_verified_at.is_none());
}

#[tokio::test]
async fn provenance_upgrades_and_never_downgrades() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let submission = unique_submission("upgrade");

    // First sighting: origin unreachable.
    let (fallback_deps, _) = make_deps(pool.clone(), None, vec![]);
    let first = resolve(&fallback_deps, &submission).await;
    assert_eq!(first.provenance, ContentProvenance::ClientFallback);

    // Second sighting: origin confirms the same content.
    let (verified_deps, _) = make_deps(
        pool.clone(),
        Some(submission.submitted_text.clone()),
        vec![],
    );
    let second = resolve(&verified_deps, &submission).await;
    assert_eq!(second.provenance, ContentProvenance::ServerVerified);

    let version = PostVersion::find_by_key(first.post_id, &first.version_hash, &pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.content_provenance, ContentProvenance::ServerVerified);
    assert!(version.server_verified_at.is_some());
    assert!(version.fetch_failure_reason.is_none());

    // A later failed fetch does not take the trust level back.
    let third = resolve(&fallback_deps, &submission).await;
    assert_eq!(third.post_version_id, first.post_version_id);
    let version = PostVersion::find_by_key(first.post_id, &first.version_hash, &pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.content_provenance, ContentProvenance::ServerVerified);
}

#[tokio::test]
async fn canonical_disagreement_fails_fast_and_persists_nothing() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let submission = unique_submission("mismatch");
    let (deps, _) = make_deps(
        pool,
        Some("entirely different canonical text".into()),
        vec![],
    );

    let error = resolve_content_identity(submission.clone(), &deps)
        .await
        .unwrap_err();
    assert!(matches!(error, IdentityError::ContentMismatch { .. }));

    // Nothing reached the database for this content.
    let blob = checkpost_domains::ContentBlob::find_by_hash(
        &checkpost_domains::content::hashing::sha256_hex(
            checkpost_domains::content::normalize::normalize_text(&submission.submitted_text)
                .as_bytes(),
        ),
        deps.pool(),
    )
    .await
    .unwrap();
    assert!(blob.is_none());
}

#[tokio::test]
async fn invalid_occurrences_are_rejected_by_name() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (deps, _) = make_deps(pool, None, vec![]);
    let mut submission = unique_submission("occurrences");
    submission.observed_occurrences = vec![
        ImageOccurrence {
            original_index: 0,
            normalized_text_offset: 5,
            source_url: "https://img.example.com/0.png".into(),
            caption_text: None,
        },
        ImageOccurrence {
            original_index: 2,
            normalized_text_offset: 9,
            source_url: "https://img.example.com/2.png".into(),
            caption_text: None,
        },
    ];

    let error = resolve_content_identity(submission, &deps).await.unwrap_err();
    assert!(matches!(
        error,
        IdentityError::Occurrence(OccurrenceError::NonContiguousOriginalIndex {
            expected: 1,
            found: 2
        })
    ));
}
