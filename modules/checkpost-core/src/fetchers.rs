//! HTTP implementations of the canonical-fetch and image-loading collaborators.
//!
//! Redirects are followed manually so the SSRF validator runs before the
//! first request and again on every hop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::StatusCode;
use tracing::warn;
use url::Url;

use crate::error::FetchFailure;
use crate::investigator::{CanonicalFetcher, ImageBlob, ImageLoader};
use crate::security::UrlValidator;
use crate::types::Platform;

const MAX_REDIRECTS: usize = 5;
const DEFAULT_USER_AGENT: &str = "CheckpostBot/1.0";

/// Build an HTTP client suitable for the fetchers: redirects disabled (the
/// fetchers hop manually) and a per-request timeout.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
}

fn map_transport(error: reqwest::Error) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Network(error.to_string())
    }
}

async fn fetch_following_redirects(
    client: &reqwest::Client,
    validator: &UrlValidator,
    user_agent: &str,
    start_url: &str,
) -> Result<reqwest::Response, FetchFailure> {
    let mut url = Url::parse(start_url)
        .map_err(|e| FetchFailure::Security(crate::error::SecurityError::from(e)))?;

    for _hop in 0..=MAX_REDIRECTS {
        validator.validate_with_dns(url.as_str()).await?;

        let response = client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| FetchFailure::Network("redirect without location".into()))?;
            url = url
                .join(location)
                .map_err(|e| FetchFailure::Security(crate::error::SecurityError::from(e)))?;
            continue;
        }

        return match status {
            StatusCode::TOO_MANY_REQUESTS => Err(FetchFailure::RateLimited),
            StatusCode::FORBIDDEN | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
                Err(FetchFailure::Blocked(format!("HTTP {}", status.as_u16())))
            }
            s if s.is_success() => Ok(response),
            s => Err(FetchFailure::Status(s.as_u16())),
        };
    }

    Err(FetchFailure::Network("too many redirects".into()))
}

/// Canonical fetcher for plain web posts: the external id is the page URL.
///
/// Social platforms need their own adapters; asking this fetcher for one
/// yields [`FetchFailure::Unsupported`] and the resolver falls back to
/// client-submitted provenance.
pub struct HttpCanonicalFetcher {
    client: reqwest::Client,
    validator: UrlValidator,
    user_agent: String,
}

impl HttpCanonicalFetcher {
    pub fn new(client: reqwest::Client, validator: UrlValidator) -> Self {
        Self {
            client,
            validator,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl CanonicalFetcher for HttpCanonicalFetcher {
    async fn fetch(&self, platform: Platform, external_id: &str) -> Result<String, FetchFailure> {
        if platform != Platform::Web {
            return Err(FetchFailure::Unsupported(platform.to_string()));
        }

        let response = fetch_following_redirects(
            &self.client,
            &self.validator,
            &self.user_agent,
            external_id,
        )
        .await?;

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true);

        let body = response.text().await.map_err(map_transport)?;
        if is_html {
            html2text::from_read(body.as_bytes(), 120)
                .map_err(|e| FetchFailure::Network(format!("html extraction: {e}")))
        } else {
            Ok(body)
        }
    }
}

/// Image loader for interleaving. Failures degrade to `None` (the occurrence
/// becomes a "missing" marker) rather than failing the investigation.
pub struct HttpImageLoader {
    client: reqwest::Client,
    validator: UrlValidator,
    max_bytes: usize,
}

impl HttpImageLoader {
    pub fn new(client: reqwest::Client, validator: UrlValidator, max_bytes: usize) -> Self {
        Self {
            client,
            validator,
            max_bytes,
        }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, source_url: &str) -> anyhow::Result<Option<ImageBlob>> {
        let response = match fetch_following_redirects(
            &self.client,
            &self.validator,
            DEFAULT_USER_AGENT,
            source_url,
        )
        .await
        {
            Ok(response) => response,
            Err(failure) => {
                warn!(url = source_url, error = %failure, "image fetch failed");
                return Ok(None);
            }
        };

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = source_url, error = %e, "image body read failed");
                return Ok(None);
            }
        };

        if bytes.len() > self.max_bytes {
            warn!(
                url = source_url,
                size = bytes.len(),
                cap = self.max_bytes,
                "image exceeds size cap, skipping"
            );
            return Ok(None);
        }

        Ok(Some(ImageBlob {
            media_type,
            bytes: bytes.to_vec(),
        }))
    }
}
