pub mod content;
pub mod error;
pub mod investigations;

pub use content::{
    resolve_content_identity, ContentBlob, ContentProvenance, ImageOccurrence,
    ImageOccurrenceSet, Post, PostVersion, RawSubmission, ResolvedIdentity,
};
pub use error::{IdentityError, InvestigateError, OccurrenceError};
pub use investigations::{
    claim_run, classify, ensure_investigation_queued, process_run, recover_stale_run,
    ClaimOutcome, ErrorClass, Investigation, InvestigationRun, InvestigationStatus, QueueOptions,
    RunOutcome,
};

/// Run the embedded SQL migrations.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
