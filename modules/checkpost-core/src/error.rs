//! Typed errors for outbound fetches, SSRF validation, and provider calls.

use std::time::Duration;

use thiserror::Error;

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Clone, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked range (loopback, private, link-local, CGNAT)
    #[error("blocked IP range: {0}")]
    BlockedAddress(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Why a canonical re-fetch did not produce authoritative content.
///
/// These are expected outcomes, not faults: a failed fetch downgrades the
/// submission to client-fallback provenance with the reason recorded.
#[derive(Debug, Clone, Error)]
pub enum FetchFailure {
    #[error("canonical fetch timed out")]
    Timeout,

    #[error("rate limited by origin")]
    RateLimited,

    #[error("blocked by origin: {0}")]
    Blocked(String),

    #[error("origin returned HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("no canonical source for platform: {0}")]
    Unsupported(String),

    #[error("security rejection: {0}")]
    Security(#[from] SecurityError),
}

impl FetchFailure {
    /// Stable label persisted as `post_versions.fetch_failure_reason`.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchFailure::Timeout => "timeout",
            FetchFailure::RateLimited => "rate_limited",
            FetchFailure::Blocked(_) => "blocked",
            FetchFailure::Status(_) => "http_status",
            FetchFailure::Network(_) => "network",
            FetchFailure::Unsupported(_) => "unsupported_platform",
            FetchFailure::Security(_) => "security",
        }
    }
}

/// Classifiable failure shape for investigator/LLM provider calls.
///
/// Provider implementations attach one of these to the error chain; the error
/// classifier downcasts to decide retryability.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("structured output failed schema validation: {0}")]
    SchemaValidation(String),

    #[error("credential source invalid or expired: {0}")]
    Credential(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}
