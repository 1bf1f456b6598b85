pub mod classify;
pub mod interleave;
pub mod lease;
pub mod models;
pub mod orchestrator;
pub mod queueing;

pub use classify::{classify, ErrorClass};
pub use lease::{claim_run, recover_stale_run, spawn_heartbeat, ClaimOutcome, HeartbeatGuard};
pub use models::{
    AttemptOutcome, Claim, ClaimSource, Investigation, InvestigationAttempt, InvestigationRun,
    InvestigationStatus,
};
pub use orchestrator::{process_run, RunOutcome};
pub use queueing::{ensure_investigation_queued, PreEnqueueHook, QueueOptions};
