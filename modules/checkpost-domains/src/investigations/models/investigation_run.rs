use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

/// The claimable unit of work, 1:1 with its investigation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvestigationRun {
    pub id: Uuid,
    pub investigation_id: Uuid,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub recover_after_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl InvestigationRun {
    pub async fn insert_if_absent<'e>(
        investigation_id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO investigation_runs (investigation_id)
            VALUES ($1)
            ON CONFLICT (investigation_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(investigation_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id<'e>(
        id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM investigation_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_investigation<'e>(
        investigation_id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM investigation_runs WHERE investigation_id = $1")
            .bind(investigation_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn mark_queued<'e>(id: Uuid, executor: impl PgExecutor<'e>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE investigation_runs SET queued_at = now() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Whether the lease no longer protects this run.
    pub fn lease_recoverable(&self, now: DateTime<Utc>) -> bool {
        match (&self.lease_owner, self.lease_expires_at) {
            (None, _) => true,
            (Some(_), Some(expires_at)) => expires_at <= now,
            (Some(_), None) => true,
        }
    }
}
