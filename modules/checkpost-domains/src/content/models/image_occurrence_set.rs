use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::content::occurrences::ImageOccurrence;

/// Content-addressed, immutable occurrence list.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageOccurrenceSet {
    pub id: Uuid,
    pub occurrences_hash: String,
    pub occurrences: Json<Vec<ImageOccurrence>>,
    pub created_at: DateTime<Utc>,
}

impl ImageOccurrenceSet {
    pub async fn insert_if_absent<'e>(
        occurrences_hash: &str,
        occurrences: &[ImageOccurrence],
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO image_occurrence_sets (occurrences_hash, occurrences)
            VALUES ($1, $2)
            ON CONFLICT (occurrences_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(occurrences_hash)
        .bind(Json(occurrences))
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_hash<'e>(
        occurrences_hash: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM image_occurrence_sets WHERE occurrences_hash = $1")
            .bind(occurrences_hash)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM image_occurrence_sets WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
