//! Anthropic-backed investigator.
//!
//! Sends the interleaved content as a multimodal message and parses the
//! structured claim list out of the reply. Failures carry [`ProviderError`]
//! markers so the orchestrator's classifier can decide retryability.

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use checkpost_core::{
    AttemptAudit, ClaimOutput, ContentPart, InvestigateRequest, Investigator, InvestigatorOutput,
    ProviderError,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

const FACT_CHECK_SYSTEM: &str = "\
You are a fact-checker. Extract the checkable factual claims from the post \
content (text and images) and assess each one against your knowledge and the \
cited context.\n\n\
Respond with a single JSON object:\n\
{\"claims\": [{\"claim_text\": \"...\", \"verdict\": \"supported|refuted|misleading|unverifiable\", \
\"confidence\": 0.0-1.0, \"explanation\": \"...\", \
\"sources\": [{\"url\": \"...\", \"title\": \"...\", \"quote\": \"...\"}]}]}\n\n\
Only include claims that are concrete and falsifiable. An empty claims list \
is a valid answer for content that asserts nothing checkable.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaimsEnvelope {
    claims: Vec<ClaimOutput>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ClaudeInvestigator {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeInvestigator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| ProviderError::Credential(e.to_string()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_blocks(request: &InvestigateRequest) -> (Vec<WireBlock>, Vec<serde_json::Value>) {
        let context = &request.context;
        let mut blocks = vec![WireBlock::Text {
            text: format!(
                "Platform: {}\nExternal id: {}\nAuthor: {}\nSource URL: {}\n\nPost content follows.",
                context.platform,
                context.external_id,
                context.author_handle.as_deref().unwrap_or("(unknown)"),
                context.source_url.as_deref().unwrap_or("(none)"),
            ),
        }];
        let mut summary = vec![json!({"kind": "context"})];

        for part in &request.parts {
            match part {
                ContentPart::Text(text) => {
                    summary.push(json!({"kind": "text", "chars": text.chars().count()}));
                    blocks.push(WireBlock::Text { text: text.clone() });
                }
                ContentPart::Image { media_type, bytes } => {
                    summary.push(json!({"kind": "image", "media_type": media_type, "bytes": bytes.len()}));
                    blocks.push(WireBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: media_type.clone(),
                            data: BASE64.encode(bytes),
                        },
                    });
                }
            }
        }
        (blocks, summary)
    }
}

#[async_trait]
impl Investigator for ClaudeInvestigator {
    async fn investigate(&self, request: InvestigateRequest) -> Result<InvestigatorOutput> {
        let (blocks, part_summary) = Self::build_blocks(&request);
        let wire = WireRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: FACT_CHECK_SYSTEM,
            messages: vec![WireMessage {
                role: "user",
                content: blocks,
            }],
        };

        debug!(model = %self.model, investigation_id = %request.investigation_id, "investigate request");

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&wire)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, message }.into());
        }

        let parsed: WireResponse = response.json().await?;
        let text = parsed
            .content
            .iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text.clone())
            .ok_or_else(|| {
                ProviderError::SchemaValidation("response contains no text block".into())
            })?;

        let envelope = parse_claims(&text)?;

        let audit = AttemptAudit {
            request: json!({
                "model": self.model,
                "prompt_id": request.prompt_id,
                "parts": part_summary,
            }),
            response: Some(json!({"text": text})),
            tool_calls: None,
            usage: Some(parsed.usage),
            model_version: Some(parsed.model),
        };

        Ok(InvestigatorOutput {
            claims: envelope.claims,
            audit,
        })
    }
}

/// Pull the JSON object out of the reply (fenced block or bare braces) and
/// validate it against the claims schema.
fn parse_claims(text: &str) -> Result<ClaimsEnvelope> {
    let json_str = if let Some(start) = text.find("```json") {
        let start = start + 7;
        let end = text[start..]
            .find("```")
            .map(|offset| start + offset)
            .ok_or_else(|| ProviderError::SchemaValidation("unterminated json fence".into()))?;
        &text[start..end]
    } else if let Some(start) = text.find('{') {
        let mut depth = 0;
        let mut end = start;
        for (i, ch) in text[start..].char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        &text[start..end]
    } else {
        return Err(ProviderError::SchemaValidation("no JSON object in response".into()).into());
    };

    serde_json::from_str(json_str.trim())
        .map_err(|e| ProviderError::SchemaValidation(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_fenced_claims_object() {
        let text = "Here you go:\n```json\n{\"claims\": [{\"claim_text\": \"x\", \"verdict\": \"supported\", \"confidence\": 0.9, \"explanation\": null, \"sources\": []}]}\n```";
        let envelope = parse_claims(text).unwrap();
        assert_eq!(envelope.claims.len(), 1);
        assert_eq!(envelope.claims[0].verdict, "supported");
    }

    #[test]
    fn parses_a_bare_object() {
        let text = "{\"claims\": []} trailing chatter";
        assert!(parse_claims(text).unwrap().claims.is_empty());
    }

    #[test]
    fn rejects_prose_with_no_json() {
        let error = parse_claims("I could not determine anything.").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ProviderError>(),
            Some(ProviderError::SchemaValidation(_))
        ));
    }

    #[test]
    fn rejects_wrong_shape() {
        let error = parse_claims("{\"verdicts\": []}").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ProviderError>(),
            Some(ProviderError::SchemaValidation(_))
        ));
    }
}
