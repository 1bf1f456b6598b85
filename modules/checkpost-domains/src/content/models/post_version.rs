use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Trust classification of content origin. Upgrades client_fallback →
/// server_verified in place; never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_provenance", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentProvenance {
    ServerVerified,
    ClientFallback,
}

/// One canonical snapshot of a post, keyed by `(post_id, version_hash)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostVersion {
    pub id: Uuid,
    pub post_id: Uuid,
    pub version_hash: String,
    pub content_blob_id: Uuid,
    pub image_occurrence_set_id: Uuid,
    pub content_provenance: ContentProvenance,
    pub fetch_failure_reason: Option<String>,
    pub server_verified_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub seen_count: i32,
}

impl PostVersion {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_if_absent<'e>(
        post_id: Uuid,
        version_hash: &str,
        content_blob_id: Uuid,
        image_occurrence_set_id: Uuid,
        provenance: ContentProvenance,
        fetch_failure_reason: Option<&str>,
        server_verified_at: Option<DateTime<Utc>>,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO post_versions
                (post_id, version_hash, content_blob_id, image_occurrence_set_id,
                 content_provenance, fetch_failure_reason, server_verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (post_id, version_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(post_id)
        .bind(version_hash)
        .bind(content_blob_id)
        .bind(image_occurrence_set_id)
        .bind(provenance)
        .bind(fetch_failure_reason)
        .bind(server_verified_at)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_key<'e>(
        post_id: Uuid,
        version_hash: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM post_versions WHERE post_id = $1 AND version_hash = $2",
        )
        .bind(post_id)
        .bind(version_hash)
        .fetch_optional(executor)
        .await
    }

    /// Most recently observed version of a post carrying the given content.
    pub async fn find_latest_for_content<'e>(
        post_id: Uuid,
        content_hash: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT pv.* FROM post_versions pv
            JOIN content_blobs cb ON cb.id = pv.content_blob_id
            WHERE pv.post_id = $1 AND cb.content_hash = $2
            ORDER BY pv.last_seen_at DESC
            LIMIT 1
            "#,
        )
        .bind(post_id)
        .bind(content_hash)
        .fetch_optional(executor)
        .await
    }

    /// Bump observation bookkeeping on a re-seen version.
    pub async fn touch_seen<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE post_versions SET last_seen_at = now(), seen_count = seen_count + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Upgrade every client-fallback version carrying this blob to
    /// server-verified. The content identity is unchanged; only the trust
    /// level improves. Returns the number of upgraded rows.
    pub async fn upgrade_provenance_for_blob<'e>(
        content_blob_id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE post_versions
            SET content_provenance = 'server_verified',
                server_verified_at = now(),
                fetch_failure_reason = NULL
            WHERE content_blob_id = $1 AND content_provenance = 'client_fallback'
            "#,
        )
        .bind(content_blob_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
