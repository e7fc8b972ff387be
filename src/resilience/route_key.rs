//! Route key resolution.
//!
//! A route key names the bucket a request is counted against before the
//! server has told us the real bucket. Dynamic ids are collapsed to `:id`
//! except the major parameter (the first id after `/channels/`, `/guilds/`
//! or `/webhooks/`), which the API uses to give otherwise identical routes
//! independent limits.

use crate::types::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds between the Unix epoch and the first snowflake.
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

const OLD_MESSAGE_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 14);
const NEW_MESSAGE_AGE: Duration = Duration::from_secs(10);

const MAJOR_PARENTS: [&str; 3] = ["channels", "guilds", "webhooks"];
const WEBHOOK_SUBPATHS: [&str; 3] = ["messages", "slack", "github"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    key: String,
    major: Option<String>,
}

impl RouteKey {
    /// A caller-supplied key, used verbatim.
    pub fn explicit(route: impl Into<String>) -> Self {
        Self {
            key: route.into(),
            major: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn major(&self) -> Option<&str> {
        self.major.as_deref()
    }

    /// Key of the server-assigned bucket this route belongs to.
    pub fn canonical(&self, bucket_hash: &str) -> String {
        format!("{}:{}", bucket_hash, self.major.as_deref().unwrap_or("-"))
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn fingerprint(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Creation time of a snowflake, in Unix milliseconds.
pub fn snowflake_timestamp(id: &str) -> Option<u64> {
    let raw: u64 = id.parse().ok()?;
    Some((raw >> 22) + SNOWFLAKE_EPOCH_MS)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteKeyResolver;

impl RouteKeyResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, method: Method, path: &str) -> RouteKey {
        self.resolve_at(method, path, unix_millis())
    }

    /// Same as [`resolve`](Self::resolve) with an explicit clock, in Unix milliseconds.
    pub fn resolve_at(&self, method: Method, path: &str, now_ms: u64) -> RouteKey {
        let path = path.split('?').next().unwrap_or(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let mut out: Vec<String> = Vec::with_capacity(segments.len());
        let mut major: Option<String> = None;
        let mut i = 0;

        while i < segments.len() {
            let segment = segments[i];
            let parent = if i > 0 { Some(segments[i - 1]) } else { None };

            if major.is_none() && is_id(segment) && parent.map_or(false, |p| MAJOR_PARENTS.contains(&p)) {
                out.push(segment.to_string());
                major = Some(segment.to_string());

                if parent == Some("webhooks") {
                    if let Some(token) = segments.get(i + 1).filter(|s| {
                        !is_id(s) && !WEBHOOK_SUBPATHS.contains(s)
                    }) {
                        out.push(":token".to_string());
                        major = Some(format!("{}/{}", segment, fingerprint(token)));
                        i += 1;
                    }
                }
            } else if parent == Some("interactions") && is_id(segment) {
                out.push(":id".to_string());
                if segments.get(i + 1).is_some() {
                    out.push(":token".to_string());
                    i += 1;
                }
            } else if segment == "reactions" {
                out.push("reactions".to_string());
                if segments.get(i + 1).is_some() {
                    out.push(":id".to_string());
                    i += 1;
                }
                if segments.get(i + 1).is_some() {
                    out.push(":userID".to_string());
                    i += 1;
                }
            } else if is_id(segment) {
                out.push(":id".to_string());
            } else {
                out.push(segment.to_string());
            }
            i += 1;
        }

        let mut route = format!("/{}", out.join("/"));
        let mut tag = method.as_str().to_string();

        if method == Method::Delete && route.ends_with("/messages/:id") {
            if let Some(created) = segments.last().and_then(|id| snowflake_timestamp(id)) {
                let age = Duration::from_millis(now_ms.saturating_sub(created));
                if age >= OLD_MESSAGE_AGE {
                    tag = "DELETE_OLD".to_string();
                } else if age <= NEW_MESSAGE_AGE {
                    tag = "DELETE_NEW".to_string();
                }
            }
        } else if matches!(method, Method::Put | Method::Delete) {
            if let Some(index) = route.find("/reactions") {
                route.truncate(index + "/reactions".len());
                tag = "MODIFY".to_string();
            }
        }

        RouteKey {
            key: format!("{} {}", tag, route),
            major,
        }
    }
}
