use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::Instant;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const BUCKET: &str = "x-ratelimit-bucket";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const SCOPE: &str = "x-ratelimit-scope";
pub const RETRY_AFTER: &str = "retry-after";
pub const DATE: &str = "date";

/// Which limit a 429 was counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    User,
    Global,
    Shared,
}

/// Rate-limit information carried by a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    /// Signed so racing responses that report negative values are tolerated.
    pub remaining: Option<i64>,
    /// Absolute reset, Unix seconds.
    pub reset: Option<f64>,
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    pub global: bool,
    pub scope: Option<RateLimitScope>,
    pub retry_after: Option<f64>,
    pub date: Option<DateTime<Utc>>,
}

/// Extract the first non-empty header value from a list of header names.
pub(crate) fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(v) = headers.get(*name) {
            if let Ok(s) = v.to_str() {
                let s = s.trim();
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    header_first(headers, &[name])?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Longest wait taken from a server hint.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds as a duration, capped at [`MAX_WAIT`]; negative or non-finite input becomes zero.
pub(crate) fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value)
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT)
    } else {
        Duration::ZERO
    }
}

/// `now + wait`, with `wait` capped at [`MAX_WAIT`].
pub(crate) fn instant_after(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait.min(MAX_WAIT)).unwrap_or(now)
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let scope = header_first(headers, &[SCOPE]).and_then(|s| match s.to_ascii_lowercase().as_str() {
            "user" => Some(RateLimitScope::User),
            "global" => Some(RateLimitScope::Global),
            "shared" => Some(RateLimitScope::Shared),
            _ => None,
        });

        Self {
            limit: header_first(headers, &[LIMIT]).and_then(|s| s.parse().ok()),
            remaining: header_first(headers, &[REMAINING]).and_then(|s| s.parse().ok()),
            reset: header_f64(headers, RESET),
            reset_after: header_f64(headers, RESET_AFTER),
            bucket: header_first(headers, &[BUCKET]),
            global: header_first(headers, &[GLOBAL])
                .map(|s| s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            scope,
            retry_after: header_f64(headers, RETRY_AFTER),
            date: header_first(headers, &[DATE])
                .and_then(|s| DateTime::parse_from_rfc2822(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    /// Whether the response carried any per-bucket state.
    pub fn has_bucket_state(&self) -> bool {
        self.limit.is_some()
            || self.remaining.is_some()
            || self.reset.is_some()
            || self.reset_after.is_some()
    }
}

/// Wait instruction extracted from a 429.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throttle {
    pub retry_after: Duration,
    pub global: bool,
}

impl Throttle {
    const DEFAULT_WAIT_SECS: f64 = 1.0;

    /// Body fields win over headers; a 429 with no wait hint waits one second.
    pub fn from_response(headers: &RateLimitHeaders, body: &[u8]) -> Self {
        let json: Option<serde_json::Value> = serde_json::from_slice(body).ok();
        let body_retry = json
            .as_ref()
            .and_then(|v| v.get("retry_after"))
            .and_then(|v| v.as_f64());
        let body_global = json
            .as_ref()
            .and_then(|v| v.get("global"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let wait = body_retry
            .or(headers.retry_after)
            .or(headers.reset_after)
            .unwrap_or(Self::DEFAULT_WAIT_SECS);

        Self {
            retry_after: secs(wait),
            global: body_global || headers.global || headers.scope == Some(RateLimitScope::Global),
        }
    }
}
