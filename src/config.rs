//! Process-wide configuration read from the environment.

use anyhow::{Context, Result};
use log::debug;
use std::time::Duration;

use crate::runtime::{Runtime, env_non_empty};

pub const BASE_URL_ENV: &str = "WELLNESS_API_BASE_URL";
pub const TIMEOUT_ENV: &str = "WELLNESS_API_TIMEOUT_MS";

/// Local development backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Settings for the REST client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            request_timeout,
        }
    }

    /// Reads the configuration from the environment, falling back to defaults.
    pub fn from_env<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let base_url = env_non_empty(runtime, BASE_URL_ENV)
            .map(|url| normalize_base_url(&url))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let request_timeout = match env_non_empty(runtime, TIMEOUT_ENV) {
            Some(raw) => parse_timeout_ms(&raw)
                .with_context(|| format!("Invalid {} value '{}'", TIMEOUT_ENV, raw))?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        debug!(
            "API base URL: {}, request timeout: {}ms",
            base_url,
            request_timeout.as_millis()
        );

        Ok(Self {
            base_url,
            request_timeout,
        })
    }

    /// Applies command-line overrides on top of the environment values.
    pub fn with_overrides(mut self, base_url: Option<&str>, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(url) = base_url {
            self.base_url = normalize_base_url(url);
        }
        if let Some(ms) = timeout_ms {
            if ms == 0 {
                anyhow::bail!("Invalid timeout: must be a positive number of milliseconds");
            }
            self.request_timeout = Duration::from_millis(ms);
        }
        Ok(self)
    }
}

/// Defaults for [`crate::loading::LoadingTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingConfig {
    /// Per-attempt timeout; zero disables it.
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            retry_delay: Duration::from_millis(2_000),
            max_retries: 2,
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_timeout_ms(raw: &str) -> Result<Duration> {
    let ms: u64 = raw.parse().context("expected a number of milliseconds")?;
    if ms == 0 {
        anyhow::bail!("timeout must be positive");
    }
    Ok(Duration::from_millis(ms))
}
