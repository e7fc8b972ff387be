//! 请求执行逻辑：单次尝试的发送、限流头解析与审计记录。
//!
//! Request execution logic (single attempt).

use crate::resilience::bucket::RateLimitBucket;
use crate::resilience::headers::{secs, RateLimitHeaders, Throttle};
use crate::resilience::route_key::RouteKey;
use crate::telemetry::RawRequest;
use crate::transport::{PreparedBody, PreparedRequest, TransportError, TransportResponse};
use crate::types::{RequestBody, RequestDescriptor};
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::core::RestClient;

pub(crate) const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

/// Result of one dispatch, after the bucket has been updated.
pub(crate) struct Attempt {
    pub result: std::result::Result<TransportResponse, TransportError>,
    /// Set for 429 responses.
    pub throttle: Option<Throttle>,
    /// Bucket that owns the route after this response.
    pub owner: Arc<RateLimitBucket>,
}

/// Percent-encode an audit-log reason as a URI component.
///
/// Spaces become `%20`, not `+`, and `!'()~` stay literal.
pub(crate) fn encode_reason(reason: &str) -> String {
    url::form_urlencoded::byte_serialize(reason.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%7E", "~")
}

fn invalid_header(field: &str, err: impl std::fmt::Display) -> Error {
    Error::validation_with_context(
        format!("invalid header value: {}", err),
        ErrorContext::new()
            .with_field_path(field)
            .with_source("request_preparation"),
    )
}

impl RestClient {
    /// Materialize headers and body once; each attempt clones the result.
    pub(crate) fn prepare(
        &self,
        request: &RequestDescriptor,
        route: &RouteKey,
        authorization: Option<&str>,
    ) -> Result<PreparedRequest> {
        let mut headers = HeaderMap::new();
        if let Some(token) = authorization {
            let mut value =
                HeaderValue::from_str(token).map_err(|e| invalid_header("request.auth", e))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(reason) = request.reason() {
            let value = HeaderValue::from_str(&encode_reason(reason))
                .map_err(|e| invalid_header("request.reason", e))?;
            headers.insert(AUDIT_LOG_REASON, value);
        }

        let body = match request.body() {
            RequestBody::Empty => PreparedBody::Empty,
            RequestBody::Json(value) => PreparedBody::Json(serde_json::to_vec(value)?.into()),
            RequestBody::Form(form) => PreparedBody::Encoded {
                content_type: form.content_type.clone(),
                body: form.body.clone(),
            },
            RequestBody::Multipart {
                payload_json,
                files,
            } => PreparedBody::Multipart {
                payload_json: payload_json
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                files: files.clone(),
            },
        };

        Ok(PreparedRequest {
            id: Uuid::new_v4(),
            method: request.method(),
            path: request.path().to_string(),
            route_key: route.as_str().to_string(),
            query: request.query().to_vec(),
            headers,
            body,
        })
    }

    /// Send one attempt and fold its headers into bucket state.
    ///
    /// Runs while the caller holds the bucket permit, so the bucket is
    /// updated before the next request on it can be dispatched.
    pub(crate) async fn execute_once(
        &self,
        prepared: &PreparedRequest,
        route: &RouteKey,
        bucket: &Arc<RateLimitBucket>,
        request: &RequestDescriptor,
    ) -> Attempt {
        let attempt = request.attempts;
        let route_key = request.route_key().unwrap_or(route.as_str());
        let mut outbound = prepared.clone();
        outbound.id = Uuid::new_v4();
        let id = outbound.id;

        let started = Instant::now();
        let result = self.transport.send(outbound).await;
        let elapsed = started.elapsed();

        let mut throttle = None;
        let mut owner = Arc::clone(bucket);

        match &result {
            Ok(resp) => {
                let headers = RateLimitHeaders::from_headers(&resp.headers);

                self.latency.record(elapsed, headers.date);
                if elapsed > self.options.latency_threshold() {
                    warn!(
                        route_key = route.as_str(),
                        latency_ms = elapsed.as_millis() as u64,
                        threshold_ms = self.options.latency_threshold_ms,
                        "request latency above threshold"
                    );
                }

                if let Some(hash) = headers.bucket.as_deref() {
                    owner = self
                        .buckets
                        .alias(route.as_str(), &route.canonical(hash), bucket);
                }
                if headers.has_bucket_state() {
                    self.apply_headers(&owner, &headers);
                }

                if resp.status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    throttle = Some(Throttle::from_response(&headers, &resp.body));
                }

                debug!(
                    route_key = route.as_str(),
                    status = resp.status.as_u16(),
                    remaining = headers.remaining,
                    reset_after = headers.reset_after,
                    attempt,
                    "attempt completed"
                );
            }
            Err(e) => {
                warn!(
                    route_key = route.as_str(),
                    attempt,
                    error = %e,
                    "attempt failed before a response"
                );
            }
        }

        self.sink
            .report(RawRequest {
                id,
                method: prepared.method.to_string(),
                path: prepared.path.clone(),
                route_key: route_key.to_string(),
                attempt,
                auth: prepared.headers.contains_key(AUTHORIZATION),
                request_body: prepared.body.describe(),
                status: result.as_ref().ok().map(|r| r.status.as_u16()),
                response_body: result
                    .as_ref()
                    .ok()
                    .map(|r| String::from_utf8_lossy(&r.body).into_owned()),
                error: result.as_ref().err().map(|e| e.to_string()),
                duration_ms: elapsed.as_millis() as u64,
            })
            .await;

        Attempt {
            result,
            throttle,
            owner,
        }
    }

    fn apply_headers(&self, bucket: &RateLimitBucket, headers: &RateLimitHeaders) {
        let compensate = !self.options.disable_latency_compensation;
        let reset_in = headers
            .reset_after
            .map(secs)
            .or_else(|| {
                headers
                    .reset
                    .map(|reset| self.latency.until_server_time(reset, compensate))
            })
            .map(|d| d.saturating_add(self.options.ratelimiter_offset()));

        bucket.update(
            headers.limit,
            headers.remaining,
            reset_in,
            headers.reset_after.map(secs),
        );
    }
}
