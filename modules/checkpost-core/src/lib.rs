pub mod config;
pub mod deps;
pub mod error;
pub mod fetchers;
pub mod investigator;
pub mod security;
pub mod types;

pub use config::AppConfig;
pub use deps::{worker_identity, WorkerDeps};
pub use error::{FetchFailure, ProviderError, SecurityError, SecurityResult};
pub use investigator::{
    AttemptAudit, CanonicalFetcher, ClaimOutput, ClaimSourceOutput, ContentPart, ImageBlob,
    ImageLoader, InvestigateRequest, Investigator, InvestigatorOutput, PlatformContext, PromptSpec,
};
pub use security::UrlValidator;
pub use types::Platform;
