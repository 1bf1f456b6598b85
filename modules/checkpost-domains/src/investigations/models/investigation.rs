use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use checkpost_core::PromptSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "investigation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

/// Exactly one per unique content identity `(post_id, content_hash)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Investigation {
    pub id: Uuid,
    pub post_id: Uuid,
    pub content_hash: String,
    pub status: InvestigationStatus,
    pub prompt_id: String,
    pub provider: String,
    pub model: String,
    pub parent_investigation_id: Option<Uuid>,
    pub content_diff: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investigation {
    pub async fn insert_if_absent<'e>(
        post_id: Uuid,
        content_hash: &str,
        prompt: &PromptSpec,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO investigations (post_id, content_hash, prompt_id, provider, model)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (post_id, content_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(post_id)
        .bind(content_hash)
        .bind(&prompt.prompt_id)
        .bind(&prompt.provider)
        .bind(&prompt.model)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM investigations WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_identity<'e>(
        post_id: Uuid,
        content_hash: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM investigations WHERE post_id = $1 AND content_hash = $2",
        )
        .bind(post_id)
        .bind(content_hash)
        .fetch_optional(executor)
        .await
    }

    /// Move a pending investigation to processing. Returns false when the
    /// row was not pending (already moved by an earlier attempt).
    pub async fn set_processing<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE investigations SET status = 'processing', updated_at = now() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Re-arm a failed investigation to pending, clearing `checked_at`.
    /// Complete investigations are never mutated by this path.
    pub async fn requeue_failed<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE investigations
            SET status = 'pending', checked_at = NULL, updated_at = now()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
