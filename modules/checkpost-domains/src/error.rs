use thiserror::Error;

/// Image occurrence validation failures. One named variant per rule; nothing
/// is silently dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OccurrenceError {
    #[error("occurrence indices are not contiguous from zero (expected {expected}, found {found})")]
    NonContiguousOriginalIndex { expected: i32, found: i32 },

    #[error("occurrence offset {offset} exceeds content length {content_len}")]
    OffsetExceedsContentLength { offset: i64, content_len: i64 },

    #[error("occurrence offset {offset} decreases after sorting (previous {previous})")]
    DecreasingNormalizedTextOffset { offset: i64, previous: i64 },
}

/// Content identity resolution failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The client-submitted content disagrees with the authoritative source.
    /// User-visible; nothing is persisted.
    #[error("submitted content does not match canonical source (submitted {submitted_hash}, canonical {canonical_hash})")]
    ContentMismatch {
        submitted_hash: String,
        canonical_hash: String,
    },

    #[error(transparent)]
    Occurrence(#[from] OccurrenceError),

    /// Hash collision or a row that never became visible. Fatal, never
    /// treated as transient.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Orchestration and queueing failures.
#[derive(Debug, Error)]
pub enum InvestigateError {
    /// Enforced only at first creation, before any row exists.
    #[error("content exceeds word limit ({word_count} words, limit {limit})")]
    WordLimitExceeded { word_count: usize, limit: usize },

    #[error("non-retryable provider failure: {0}")]
    NonRetryable(#[source] anyhow::Error),

    /// Lease released, status untouched; the queue's backoff will retry.
    #[error("transient provider failure: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("pre-enqueue hook failed: {0}")]
    PreEnqueue(#[source] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] checkpost_queue::QueueError),
}
