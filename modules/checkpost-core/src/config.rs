use std::time::Duration;

use anyhow::Result;

/// Application configuration loaded from environment variables.
///
/// Required: `DATABASE_URL`. Everything else has a default or is optional.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // AI / LLM
    pub anthropic_api_key: Option<String>,
    pub investigation_model: String,
    pub prompt_id: String,

    // Content gating
    pub max_content_words: usize,

    // Leases
    pub lease_ttl_secs: u64,
    pub recover_after_secs: u64,

    // Timeouts
    pub canonical_fetch_timeout_secs: u64,
    pub investigate_timeout_secs: u64,

    // Unique-constraint race resolution
    pub conflict_retry_attempts: u32,
    pub conflict_retry_delay_ms: u64,

    // Image interleaving
    pub max_images_per_request: usize,
    pub max_image_bytes: usize,

    // Queue (in-memory backend)
    pub queue_max_attempts: i32,
    pub queue_base_backoff_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            investigation_model: env_or("INVESTIGATION_MODEL", "claude-sonnet-4-20250514"),
            prompt_id: env_or("INVESTIGATION_PROMPT_ID", "fact-check-v1"),
            max_content_words: env_num("MAX_CONTENT_WORDS", 10_000),
            lease_ttl_secs: env_num("LEASE_TTL_SECS", 60),
            recover_after_secs: env_num("RECOVER_AFTER_SECS", 30),
            canonical_fetch_timeout_secs: env_num("CANONICAL_FETCH_TIMEOUT_SECS", 10),
            investigate_timeout_secs: env_num("INVESTIGATE_TIMEOUT_SECS", 300),
            conflict_retry_attempts: env_num("CONFLICT_RETRY_ATTEMPTS", 30),
            conflict_retry_delay_ms: env_num("CONFLICT_RETRY_DELAY_MS", 20),
            max_images_per_request: env_num("MAX_IMAGES_PER_REQUEST", 8),
            max_image_bytes: env_num("MAX_IMAGE_BYTES", 5 * 1024 * 1024),
            queue_max_attempts: env_num("QUEUE_MAX_ATTEMPTS", 5),
            queue_base_backoff_ms: env_num("QUEUE_BASE_BACKOFF_MS", 2_000),
        })
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Heartbeat period is a quarter of the lease TTL.
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs((self.lease_ttl_secs / 4).max(1))
    }

    pub fn canonical_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.canonical_fetch_timeout_secs)
    }

    pub fn investigate_timeout(&self) -> Duration {
        Duration::from_secs(self.investigate_timeout_secs)
    }

    pub fn conflict_retry_delay(&self) -> Duration {
        Duration::from_millis(self.conflict_retry_delay_ms)
    }

    pub fn queue_base_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_base_backoff_ms)
    }

    pub fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.len().min(5);
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
        tracing::info!("  INVESTIGATION_MODEL: {}", self.investigation_model);
        tracing::info!("  INVESTIGATION_PROMPT_ID: {}", self.prompt_id);
        tracing::info!("  MAX_CONTENT_WORDS: {}", self.max_content_words);
        tracing::info!("  LEASE_TTL_SECS: {}", self.lease_ttl_secs);
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
