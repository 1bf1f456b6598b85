//! Content identity resolution.
//!
//! Turns an arbitrary observed submission into a stable content-addressed
//! identity with a trust classification, idempotently persisting the blob,
//! occurrence set, and post version.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{debug, info};
use uuid::Uuid;

use checkpost_core::{FetchFailure, Platform, WorkerDeps};

use crate::content::hashing::{sha256_hex, version_hash};
use crate::content::models::{ContentBlob, ImageOccurrenceSet, Post, PostVersion};
use crate::content::models::post_version::ContentProvenance;
use crate::content::normalize::{normalize_text, word_count};
use crate::content::occurrences::{occurrences_hash, validate_occurrences, ImageOccurrence};
use crate::error::IdentityError;

/// Platform-specific raw submission plus optional observed image occurrences.
#[derive(Debug, Clone)]
pub struct RawSubmission {
    pub platform: Platform,
    pub external_id: String,
    pub author_handle: Option<String>,
    pub source_url: Option<String>,
    pub submitted_text: String,
    pub observed_occurrences: Vec<ImageOccurrence>,
}

/// The resolved, persisted content identity.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub post_id: Uuid,
    pub post_version_id: Uuid,
    pub content_blob_id: Uuid,
    pub content_hash: String,
    pub occurrences_hash: String,
    pub version_hash: String,
    pub provenance: ContentProvenance,
    pub normalized_text: String,
    pub word_count: usize,
    pub occurrences: Vec<ImageOccurrence>,
}

/// Canonicalize a submission into a content-addressed identity.
///
/// Fails fast with [`IdentityError::ContentMismatch`] when the origin serves
/// different content than the client submitted; a failed canonical fetch
/// degrades to client-fallback provenance instead.
pub async fn resolve_content_identity(
    submission: RawSubmission,
    deps: &WorkerDeps,
) -> Result<ResolvedIdentity, IdentityError> {
    let normalized = normalize_text(&submission.submitted_text);
    let words = word_count(&normalized);
    let content_hash = sha256_hex(normalized.as_bytes());

    let (provenance, fetch_failure_reason, server_verified_at) =
        verify_against_origin(&submission, &content_hash, deps).await?;

    let content_len = normalized.chars().count();
    let occurrences = validate_occurrences(submission.observed_occurrences, content_len)?;
    let occ_hash = occurrences_hash(&occurrences);
    let ver_hash = version_hash(&content_hash, &occ_hash);

    let post = Post::get_or_create(
        submission.platform,
        &submission.external_id,
        submission.author_handle.as_deref(),
        submission.source_url.as_deref(),
        deps.pool(),
    )
    .await?;

    let mut tx = deps.pool().begin().await?;
    let blob = get_or_insert_blob(&mut tx, &content_hash, &normalized, words, deps).await?;
    let set = get_or_insert_occurrence_set(&mut tx, &occ_hash, &occurrences, deps).await?;
    let version = get_or_insert_version(
        &mut tx,
        post.id,
        &ver_hash,
        blob.id,
        set.id,
        provenance,
        fetch_failure_reason,
        server_verified_at,
        deps,
    )
    .await?;

    if provenance == ContentProvenance::ServerVerified {
        let upgraded = PostVersion::upgrade_provenance_for_blob(blob.id, &mut *tx).await?;
        if upgraded > 0 {
            info!(
                content_hash = %content_hash,
                upgraded,
                "upgraded client-fallback versions to server-verified"
            );
        }
    }
    tx.commit().await?;

    debug!(
        post_id = %post.id,
        version_hash = %ver_hash,
        provenance = ?provenance,
        "resolved content identity"
    );

    Ok(ResolvedIdentity {
        post_id: post.id,
        post_version_id: version.id,
        content_blob_id: blob.id,
        content_hash,
        occurrences_hash: occ_hash,
        version_hash: ver_hash,
        provenance,
        normalized_text: normalized,
        word_count: words,
        occurrences,
    })
}

/// Re-fetch the content from its origin under a bounded timeout and compare
/// hashes. Returns the provenance triple for the version row.
async fn verify_against_origin(
    submission: &RawSubmission,
    content_hash: &str,
    deps: &WorkerDeps,
) -> Result<(ContentProvenance, Option<&'static str>, Option<DateTime<Utc>>), IdentityError> {
    let fetched = tokio::time::timeout(
        deps.config.canonical_fetch_timeout(),
        deps.canonical_fetcher
            .fetch(submission.platform, &submission.external_id),
    )
    .await;

    match fetched {
        Ok(Ok(canonical_raw)) => {
            let canonical_hash = sha256_hex(normalize_text(&canonical_raw).as_bytes());
            if canonical_hash != content_hash {
                return Err(IdentityError::ContentMismatch {
                    submitted_hash: content_hash.to_string(),
                    canonical_hash,
                });
            }
            Ok((ContentProvenance::ServerVerified, None, Some(Utc::now())))
        }
        Ok(Err(failure)) => {
            info!(
                platform = %submission.platform,
                external_id = %submission.external_id,
                reason = failure.reason(),
                "canonical fetch failed, falling back to client content"
            );
            Ok((ContentProvenance::ClientFallback, Some(failure.reason()), None))
        }
        Err(_elapsed) => Ok((
            ContentProvenance::ClientFallback,
            Some(FetchFailure::Timeout.reason()),
            None,
        )),
    }
}

async fn get_or_insert_blob(
    conn: &mut PgConnection,
    content_hash: &str,
    normalized: &str,
    words: usize,
    deps: &WorkerDeps,
) -> Result<ContentBlob, IdentityError> {
    if let Some(blob) =
        ContentBlob::insert_if_absent(content_hash, normalized, words as i32, &mut *conn).await?
    {
        return Ok(blob);
    }
    // Lost a creation race: poll until the winner's row is visible, then
    // assert byte-equality. A mismatch is a hash collision, not a retry.
    for _ in 0..deps.config.conflict_retry_attempts {
        if let Some(existing) = ContentBlob::find_by_hash(content_hash, &mut *conn).await? {
            if existing.content_text != normalized {
                return Err(IdentityError::InternalConsistency(format!(
                    "content hash collision on {content_hash}"
                )));
            }
            return Ok(existing);
        }
        tokio::time::sleep(deps.config.conflict_retry_delay()).await;
    }
    Err(IdentityError::InternalConsistency(format!(
        "content blob {content_hash} never became visible after conflict"
    )))
}

async fn get_or_insert_occurrence_set(
    conn: &mut PgConnection,
    occ_hash: &str,
    occurrences: &[ImageOccurrence],
    deps: &WorkerDeps,
) -> Result<ImageOccurrenceSet, IdentityError> {
    if let Some(set) =
        ImageOccurrenceSet::insert_if_absent(occ_hash, occurrences, &mut *conn).await?
    {
        return Ok(set);
    }
    for _ in 0..deps.config.conflict_retry_attempts {
        if let Some(existing) = ImageOccurrenceSet::find_by_hash(occ_hash, &mut *conn).await? {
            if existing.occurrences.0 != occurrences {
                return Err(IdentityError::InternalConsistency(format!(
                    "occurrence hash collision on {occ_hash}"
                )));
            }
            return Ok(existing);
        }
        tokio::time::sleep(deps.config.conflict_retry_delay()).await;
    }
    Err(IdentityError::InternalConsistency(format!(
        "occurrence set {occ_hash} never became visible after conflict"
    )))
}

#[allow(clippy::too_many_arguments)]
async fn get_or_insert_version(
    conn: &mut PgConnection,
    post_id: Uuid,
    ver_hash: &str,
    content_blob_id: Uuid,
    image_occurrence_set_id: Uuid,
    provenance: ContentProvenance,
    fetch_failure_reason: Option<&str>,
    server_verified_at: Option<DateTime<Utc>>,
    deps: &WorkerDeps,
) -> Result<PostVersion, IdentityError> {
    if let Some(version) = PostVersion::insert_if_absent(
        post_id,
        ver_hash,
        content_blob_id,
        image_occurrence_set_id,
        provenance,
        fetch_failure_reason,
        server_verified_at,
        &mut *conn,
    )
    .await?
    {
        return Ok(version);
    }
    for _ in 0..deps.config.conflict_retry_attempts {
        if let Some(existing) = PostVersion::find_by_key(post_id, ver_hash, &mut *conn).await? {
            if existing.content_blob_id != content_blob_id
                || existing.image_occurrence_set_id != image_occurrence_set_id
            {
                return Err(IdentityError::InternalConsistency(format!(
                    "version hash collision on {ver_hash} for post {post_id}"
                )));
            }
            PostVersion::touch_seen(existing.id, &mut *conn).await?;
            return Ok(existing);
        }
        tokio::time::sleep(deps.config.conflict_retry_delay()).await;
    }
    Err(IdentityError::InternalConsistency(format!(
        "post version {ver_hash} never became visible after conflict"
    )))
}
