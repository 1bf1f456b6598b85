//! Collaborator traits the orchestration core depends on.
//!
//! Implementations live at the edges (worker binary, platform adapters); the
//! core only sees these contracts.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FetchFailure;
use crate::types::Platform;

/// Which prompt/provider/model an investigation is pinned to at creation.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub prompt_id: String,
    pub provider: String,
    pub model: String,
}

/// One piece of the interleaved multimodal request body.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    Image { media_type: String, bytes: Vec<u8> },
}

/// Post/platform metadata handed to the investigator alongside the content.
#[derive(Debug, Clone)]
pub struct PlatformContext {
    pub platform: Platform,
    pub external_id: String,
    pub author_handle: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvestigateRequest {
    pub investigation_id: Uuid,
    pub prompt_id: String,
    pub parts: Vec<ContentPart>,
    pub context: PlatformContext,
}

/// One fact-checked claim in the investigator's structured output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClaimOutput {
    pub claim_text: String,
    /// e.g. "supported", "refuted", "misleading", "unverifiable"
    pub verdict: String,
    pub confidence: Option<f32>,
    pub explanation: Option<String>,
    pub sources: Vec<ClaimSourceOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClaimSourceOutput {
    pub url: String,
    pub title: Option<String>,
    pub quote: Option<String>,
}

/// Immutable record of one provider call, persisted per attempt.
#[derive(Debug, Clone, Default)]
pub struct AttemptAudit {
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub tool_calls: Option<serde_json::Value>,
    pub usage: Option<serde_json::Value>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvestigatorOutput {
    pub claims: Vec<ClaimOutput>,
    pub audit: AttemptAudit,
}

/// The LLM fact-checker. Opaque: retryability of a failure is inferred purely
/// from the shape of the error it returns (see the error classifier).
#[async_trait]
pub trait Investigator: Send + Sync {
    async fn investigate(&self, request: InvestigateRequest) -> anyhow::Result<InvestigatorOutput>;
}

/// Authoritative re-fetch of a post's content from its origin.
///
/// Returns the raw canonical text (the resolver normalizes it); a
/// [`FetchFailure`] downgrades the submission to client-fallback provenance.
#[async_trait]
pub trait CanonicalFetcher: Send + Sync {
    async fn fetch(&self, platform: Platform, external_id: &str) -> Result<String, FetchFailure>;
}

#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Fetches image bytes for interleaving. `Ok(None)` means the image is
/// unavailable at inference time; the occurrence degrades to a text marker.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, source_url: &str) -> anyhow::Result<Option<ImageBlob>>;
}
