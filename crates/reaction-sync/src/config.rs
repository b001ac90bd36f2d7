//! Gateway configuration resolution.

use std::time::Duration;

use crate::error::{ReactionError, Result};

pub const ENV_GATEWAY_BASE_URL: &str = "KINDRED_GATEWAY_BASE_URL";
pub const ENV_GATEWAY_API_KEY: &str = "KINDRED_GATEWAY_API_KEY";
pub const ENV_CALL_TIMEOUT_MS: &str = "KINDRED_GATEWAY_TIMEOUT_MS";

pub const DEFAULT_GATEWAY_BASE_URL: &str = "http://127.0.0.1:54321";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(4);

pub const BASE_URL_SOURCE_DEFAULT: &str = "default_local";

/// Resolved gateway configuration with provenance for the base url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub base_url_source: String,
    pub api_key: Option<String>,
    pub call_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            base_url_source: BASE_URL_SOURCE_DEFAULT.to_string(),
            api_key: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Resolves configuration from the environment, falling back to the
    /// local default backend when nothing is set.
    pub fn from_env() -> Result<Self> {
        let (base_url, base_url_source) = match env_non_empty(ENV_GATEWAY_BASE_URL) {
            Some(raw) => (normalize_base_url(&raw)?, ENV_GATEWAY_BASE_URL.to_string()),
            None => (
                normalize_base_url(DEFAULT_GATEWAY_BASE_URL)?,
                BASE_URL_SOURCE_DEFAULT.to_string(),
            ),
        };

        let call_timeout = env_non_empty(ENV_CALL_TIMEOUT_MS)
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_CALL_TIMEOUT, Duration::from_millis);

        Ok(Self {
            base_url,
            base_url_source,
            api_key: env_non_empty(ENV_GATEWAY_API_KEY),
            call_timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = normalize_base_url(base_url)?;
        self.base_url_source = "explicit".to_string();
        Ok(self)
    }
}

/// Trims, strips trailing slashes, and enforces an http(s) scheme.
pub fn normalize_base_url(value: &str) -> Result<String> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(ReactionError::InvalidBaseUrl(
            "base url must not be empty".to_string(),
        ));
    }
    let parsed = url::Url::parse(normalized)
        .map_err(|error| ReactionError::InvalidBaseUrl(error.to_string()))?;
    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ReactionError::InvalidBaseUrl(format!(
            "unsupported scheme: {scheme}"
        )));
    }
    Ok(normalized.trim_end_matches('/').to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
