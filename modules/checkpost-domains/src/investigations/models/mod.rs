pub mod claim;
pub mod investigation;
pub mod investigation_attempt;
pub mod investigation_run;

pub use claim::{Claim, ClaimSource};
pub use investigation::{Investigation, InvestigationStatus};
pub use investigation_attempt::{AttemptOutcome, InvestigationAttempt};
pub use investigation_run::InvestigationRun;
