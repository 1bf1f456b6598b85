use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Content-addressed normalized text. Immutable; identical normalized text
/// always maps to the same row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentBlob {
    pub id: Uuid,
    pub content_hash: String,
    pub content_text: String,
    pub word_count: i32,
    pub created_at: DateTime<Utc>,
}

impl ContentBlob {
    /// Insert unless a row with this hash already exists. `None` means the
    /// caller lost a creation race and should re-read.
    pub async fn insert_if_absent<'e>(
        content_hash: &str,
        content_text: &str,
        word_count: i32,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO content_blobs (content_hash, content_text, word_count)
            VALUES ($1, $2, $3)
            ON CONFLICT (content_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(content_hash)
        .bind(content_text)
        .bind(word_count)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_hash<'e>(
        content_hash: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM content_blobs WHERE content_hash = $1")
            .bind(content_hash)
            .fetch_optional(executor)
            .await
    }
}
