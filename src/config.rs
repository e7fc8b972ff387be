//! Client options.
//!
//! Options can be built in code, deserialized from YAML, or left at their
//! defaults. Every field has a default so partial files are valid:
//!
//! ```yaml
//! base_url: https://discord.com/api/v10
//! request_timeout_ms: 10000
//! max_inflight: 16
//! retry:
//!   max_attempts: 5
//! ```

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

pub fn default_user_agent() -> String {
    format!("DiscordBot (discord-rest-rs, {})", env!("CARGO_PKG_VERSION"))
}

/// Retry knobs for transient failures (network errors and 5xx).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Total attempts per request for transient failures. 429s are not counted.
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestOptions {
    pub base_url: String,
    pub user_agent: String,
    /// Transport-level timeout of a single attempt.
    pub request_timeout_ms: u64,
    /// Measured latency above this is logged as a warning.
    pub latency_threshold_ms: u64,
    /// Extra time added to every bucket reset.
    pub ratelimiter_offset_ms: u64,
    /// Ignore the measured clock offset when converting absolute reset times.
    pub disable_latency_compensation: bool,
    /// Application-wide ceiling on concurrently outstanding requests.
    pub max_inflight: Option<usize>,
    /// Application-wide ceiling on dispatches per second.
    pub requests_per_second: Option<f64>,
    /// Deadline applied to requests that do not carry their own.
    pub default_timeout_ms: Option<u64>,
    pub retry: RetryOptions,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            request_timeout_ms: 15_000,
            latency_threshold_ms: 30_000,
            ratelimiter_offset_ms: 0,
            disable_latency_compensation: false,
            max_inflight: None,
            requests_per_second: None,
            default_timeout_ms: None,
            retry: RetryOptions::default(),
        }
    }
}

impl RestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let options: RestOptions = serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid options document: {}", e),
                ErrorContext::new().with_source("options_loader"),
            )
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read options file: {}", e),
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_source("options_loader"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::configuration_with_context(
                format!("base_url must be an http(s) URL, got '{}'", self.base_url),
                ErrorContext::new()
                    .with_field_path("options.base_url")
                    .with_source("options_validator"),
            ));
        }
        if let Some(rps) = self.requests_per_second {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(Error::configuration_with_context(
                    "requests_per_second must be a positive number",
                    ErrorContext::new()
                        .with_field_path("options.requests_per_second")
                        .with_source("options_validator"),
                ));
            }
        }
        if self.max_inflight == Some(0) {
            return Err(Error::configuration_with_context(
                "max_inflight must be at least 1",
                ErrorContext::new()
                    .with_field_path("options.max_inflight")
                    .with_source("options_validator"),
            ));
        }
        Ok(())
    }

    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }

    pub fn ratelimiter_offset(&self) -> Duration {
        Duration::from_millis(self.ratelimiter_offset_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_inflight(mut self, n: usize) -> Self {
        self.max_inflight = Some(n.max(1));
        self
    }

    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }
}
