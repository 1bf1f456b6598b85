use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use checkpost_core::AttemptAudit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attempt_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// Immutable audit of one execution attempt. A replay of the same attempt
/// number upserts rather than duplicating.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvestigationAttempt {
    pub id: Uuid,
    pub investigation_id: Uuid,
    pub attempt_number: i32,
    pub outcome: AttemptOutcome,
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub tool_calls: Option<serde_json::Value>,
    pub token_usage: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl InvestigationAttempt {
    pub async fn record<'e>(
        investigation_id: Uuid,
        attempt_number: i32,
        outcome: AttemptOutcome,
        audit: &AttemptAudit,
        error_kind: Option<&str>,
        error_message: Option<&str>,
        executor: impl PgExecutor<'e>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO investigation_attempts
                (investigation_id, attempt_number, outcome, request, response,
                 tool_calls, token_usage, error_kind, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (investigation_id, attempt_number) DO UPDATE SET
                outcome = EXCLUDED.outcome,
                request = EXCLUDED.request,
                response = EXCLUDED.response,
                tool_calls = EXCLUDED.tool_calls,
                token_usage = EXCLUDED.token_usage,
                error_kind = EXCLUDED.error_kind,
                error_message = EXCLUDED.error_message,
                finished_at = now()
            RETURNING *
            "#,
        )
        .bind(investigation_id)
        .bind(attempt_number)
        .bind(outcome)
        .bind(&audit.request)
        .bind(&audit.response)
        .bind(&audit.tool_calls)
        .bind(&audit.usage)
        .bind(error_kind)
        .bind(error_message)
        .fetch_one(executor)
        .await
    }

    pub async fn find_for_investigation<'e>(
        investigation_id: Uuid,
        executor: impl PgExecutor<'e>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM investigation_attempts WHERE investigation_id = $1 ORDER BY attempt_number ASC",
        )
        .bind(investigation_id)
        .fetch_all(executor)
        .await
    }
}
