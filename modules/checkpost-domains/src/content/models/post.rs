use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use checkpost_core::Platform;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub platform: Platform,
    pub external_id: String,
    pub author_handle: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Get or create the post row for `(platform, external_id)`, filling in
    /// author/source metadata the first observation lacked.
    pub async fn get_or_create<'e>(
        platform: Platform,
        external_id: &str,
        author_handle: Option<&str>,
        source_url: Option<&str>,
        executor: impl PgExecutor<'e>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO posts (platform, external_id, author_handle, source_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (platform, external_id) DO UPDATE SET
                author_handle = COALESCE(posts.author_handle, EXCLUDED.author_handle),
                source_url = COALESCE(posts.source_url, EXCLUDED.source_url)
            RETURNING *
            "#,
        )
        .bind(platform)
        .bind(external_id)
        .bind(author_handle)
        .bind(source_url)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
