use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use checkpost_core::ClaimOutput;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Claim {
    pub id: Uuid,
    pub investigation_id: Uuid,
    pub claim_text: String,
    pub verdict: String,
    pub confidence: Option<f32>,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClaimSource {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub quote: Option<String>,
}

impl Claim {
    /// Replace the full claim set for an investigation. Runs inside the
    /// caller's transaction; the old set is deleted, never merged.
    pub async fn replace_for_investigation(
        investigation_id: Uuid,
        claims: &[ClaimOutput],
        conn: &mut PgConnection,
    ) -> Result<usize, sqlx::Error> {
        sqlx::query("DELETE FROM claims WHERE investigation_id = $1")
            .bind(investigation_id)
            .execute(&mut *conn)
            .await?;

        for output in claims {
            let claim_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO claims (investigation_id, claim_text, verdict, confidence, explanation)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(investigation_id)
            .bind(&output.claim_text)
            .bind(&output.verdict)
            .bind(output.confidence)
            .bind(&output.explanation)
            .fetch_one(&mut *conn)
            .await?;

            for source in &output.sources {
                sqlx::query(
                    "INSERT INTO claim_sources (claim_id, url, title, quote) VALUES ($1, $2, $3, $4)",
                )
                .bind(claim_id)
                .bind(&source.url)
                .bind(&source.title)
                .bind(&source.quote)
                .execute(&mut *conn)
                .await?;
            }
        }

        Ok(claims.len())
    }

    pub async fn find_for_investigation<'e>(
        investigation_id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM claims WHERE investigation_id = $1 ORDER BY created_at ASC",
        )
        .bind(investigation_id)
        .fetch_all(executor)
        .await
    }
}
