//! Retryability classification of investigator failures.
//!
//! Every orchestrator-level failure passes through here before being
//! persisted or propagated; nothing bypasses classification.

use checkpost_core::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on retry: rate limits, 5xx, timeouts, network faults,
    /// and anything unclassifiable.
    Transient,
    /// Will never succeed unmodified: schema validation, deterministic
    /// parse errors, dead credentials, 4xx-class statuses.
    NonRetryable,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::NonRetryable => "non_retryable",
        }
    }
}

/// Walk the error chain to the deepest classifiable cause and classify it.
/// Unknown shapes default to transient so the queue's bounded retries get a
/// chance; the attempt cap still terminates hopeless jobs.
pub fn classify(error: &anyhow::Error) -> ErrorClass {
    for cause in error.chain() {
        if let Some(provider) = cause.downcast_ref::<ProviderError>() {
            return match provider {
                ProviderError::SchemaValidation(_) | ProviderError::Credential(_) => {
                    ErrorClass::NonRetryable
                }
                ProviderError::Http { status, .. } => classify_status(*status),
                ProviderError::Timeout(_) => ErrorClass::Transient,
            };
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ErrorClass::NonRetryable;
        }
        if let Some(transport) = cause.downcast_ref::<reqwest::Error>() {
            if let Some(status) = transport.status() {
                return classify_status(status.as_u16());
            }
            return ErrorClass::Transient;
        }
    }
    ErrorClass::Transient
}

fn classify_status(status: u16) -> ErrorClass {
    match status {
        // Request timeout, too-early, and rate limiting all clear up on
        // their own.
        408 | 425 | 429 => ErrorClass::Transient,
        400..=499 => ErrorClass::NonRetryable,
        _ => ErrorClass::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::time::Duration;

    fn http(status: u16) -> anyhow::Error {
        anyhow::Error::new(ProviderError::Http {
            status,
            message: "provider says no".into(),
        })
    }

    #[test]
    fn rate_limit_is_transient() {
        assert_eq!(classify(&http(429)), ErrorClass::Transient);
    }

    #[test]
    fn bad_request_is_non_retryable() {
        assert_eq!(classify(&http(400)), ErrorClass::NonRetryable);
        assert_eq!(classify(&http(401)), ErrorClass::NonRetryable);
        assert_eq!(classify(&http(403)), ErrorClass::NonRetryable);
    }

    #[test]
    fn server_errors_are_transient() {
        assert_eq!(classify(&http(500)), ErrorClass::Transient);
        assert_eq!(classify(&http(503)), ErrorClass::Transient);
    }

    #[test]
    fn schema_validation_is_non_retryable() {
        let error = anyhow::Error::new(ProviderError::SchemaValidation(
            "claims missing verdict".into(),
        ));
        assert_eq!(classify(&error), ErrorClass::NonRetryable);
    }

    #[test]
    fn credential_failure_is_non_retryable() {
        let error = anyhow::Error::new(ProviderError::Credential("token expired".into()));
        assert_eq!(classify(&error), ErrorClass::NonRetryable);
    }

    #[test]
    fn timeout_is_transient() {
        let error = anyhow::Error::new(ProviderError::Timeout(Duration::from_secs(300)));
        assert_eq!(classify(&error), ErrorClass::Transient);
    }

    #[test]
    fn parse_error_is_non_retryable() {
        let parse_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert_eq!(
            classify(&anyhow::Error::new(parse_error)),
            ErrorClass::NonRetryable
        );
    }

    #[test]
    fn wrapped_causes_are_still_found() {
        let error = anyhow::Error::new(ProviderError::Http {
            status: 429,
            message: "slow down".into(),
        })
        .context("investigate call failed");
        assert_eq!(classify(&error), ErrorClass::Transient);
    }

    #[test]
    fn unknown_errors_default_to_transient() {
        assert_eq!(
            classify(&anyhow::anyhow!("something odd")),
            ErrorClass::Transient
        );
    }
}
