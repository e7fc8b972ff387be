use crate::client::error_classification::ErrorClassifier;
use crate::client::policy::{Decision, Outcome, PolicyEngine};
use crate::client::signals::SignalsSnapshot;
use crate::config::RestOptions;
use crate::error::TimeoutStage;
use crate::resilience::bucket::{BucketPermit, Placement, RateLimitBucket, Reservation};
use crate::resilience::route_key::{RouteKey, RouteKeyResolver};
use crate::resilience::{BucketRegistry, GlobalLimiter, LatencyTracker};
use crate::telemetry::RequestSink;
use crate::transport::{PreparedRequest, Transport, TransportError, TransportResponse};
use crate::types::{Auth, Method, RequestDescriptor, RestResponse};
use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Rate-limit aware REST client.
///
/// Cheap to clone; clones share buckets, the global limiter and the transport.
#[derive(Clone)]
pub struct RestClient {
    pub(crate) options: Arc<RestOptions>,
    pub(crate) token: Option<Arc<str>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) buckets: Arc<BucketRegistry>,
    pub(crate) global: Arc<GlobalLimiter>,
    pub(crate) latency: Arc<LatencyTracker>,
    pub(crate) resolver: RouteKeyResolver,
    pub(crate) policy: Arc<PolicyEngine>,
    pub(crate) sink: Arc<dyn RequestSink>,
}

/// How one tenure on a bucket ended.
enum Tenure {
    Done(RestResponse),
    /// The bucket was merged; continue on the target.
    Moved {
        target: Arc<RateLimitBucket>,
        dispatched: bool,
    },
}

/// Per-call bookkeeping for deadline errors.
struct CallContext {
    method: Method,
    path: String,
    started: Instant,
    deadline: Option<Instant>,
}

impl CallContext {
    fn timeout(&self, stage: TimeoutStage) -> Error {
        Error::Timeout {
            method: self.method,
            path: self.path.clone(),
            stage,
            waited_ms: self.started.elapsed().as_millis(),
        }
    }

    /// Await `fut` unless the caller's deadline passes first.
    async fn within<F: Future>(&self, stage: TimeoutStage, fut: F) -> Result<F::Output> {
        match self.deadline {
            None => Ok(fut.await),
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| self.timeout(stage)),
        }
    }
}

impl RestClient {
    pub fn builder() -> crate::client::RestClientBuilder {
        crate::client::RestClientBuilder::new()
    }

    pub fn options(&self) -> &RestOptions {
        &self.options
    }

    /// Submit a request and wait for its terminal outcome.
    ///
    /// Queueing, throttles and transient retries are absorbed here; the
    /// caller sees either the decoded body or a single error.
    pub async fn request(&self, mut request: RequestDescriptor) -> Result<RestResponse> {
        let started = Instant::now();
        let ctx = CallContext {
            method: request.method(),
            path: request.path().to_string(),
            started,
            deadline: request
                .timeout()
                .or_else(|| self.options.default_timeout())
                .map(|t| started + t),
        };

        let authorization = self.authorization(&request)?;
        let route = match request.route() {
            Some(explicit) => RouteKey::explicit(explicit),
            None => self.resolver.resolve(request.method(), request.path()),
        };
        let prepared = self.prepare(&request, &route, authorization.as_deref())?;

        let mut bucket = self.buckets.get_or_create(route.as_str());
        request.route_key = Some(self.buckets.bucket_key(route.as_str()));
        let mut placement = Placement::for_priority(request.is_priority());

        loop {
            let permit = ctx
                .within(TimeoutStage::Queued, bucket.enqueue(placement).granted())
                .await?;

            match self
                .hold(&mut request, &prepared, &route, &ctx, permit)
                .await?
            {
                Tenure::Done(response) => return Ok(response),
                Tenure::Moved { target, dispatched } => {
                    debug!(
                        route_key = route.as_str(),
                        from = bucket.key(),
                        to = target.key(),
                        "request moved to shared bucket"
                    );
                    request.route_key = Some(self.buckets.bucket_key(route.as_str()));
                    bucket = target;
                    // Already dispatched once: keep its place ahead of queued work.
                    if dispatched {
                        placement = Placement::Front;
                    }
                }
            }
        }
    }

    /// Dispatch repeatedly while holding the bucket, until a terminal outcome or a move.
    async fn hold(
        &self,
        request: &mut RequestDescriptor,
        prepared: &PreparedRequest,
        route: &RouteKey,
        ctx: &CallContext,
        permit: BucketPermit,
    ) -> Result<Tenure> {
        let mut dispatched = false;
        loop {
            match permit.reserve() {
                Reservation::Ready => {}
                Reservation::Redirect(target) => {
                    return Ok(Tenure::Moved { target, dispatched });
                }
                Reservation::Wait(until) => {
                    debug!(
                        route_key = route.as_str(),
                        wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "bucket exhausted, waiting for reset"
                    );
                    ctx.within(TimeoutStage::RateLimited, tokio::time::sleep_until(until))
                        .await?;
                    continue;
                }
            }

            let slot = ctx
                .within(TimeoutStage::GlobalLimit, self.global.acquire())
                .await?;
            let attempt = self
                .execute_once(prepared, route, permit.bucket(), request)
                .await;
            slot.release();
            dispatched = true;
            request.route_key = Some(self.buckets.bucket_key(route.as_str()));

            let outcome = match &attempt.result {
                Ok(resp) => Outcome::Response {
                    status: resp.status,
                    throttle: attempt.throttle.as_ref(),
                },
                Err(_) => Outcome::TransportFailure,
            };

            match self.policy.decide(outcome, request.attempts) {
                Decision::Complete => {
                    return self.finish(request, attempt.result).map(Tenure::Done);
                }
                Decision::Throttle(throttle) => {
                    if throttle.global {
                        warn!(
                            route_key = route.as_str(),
                            retry_after_ms = throttle.retry_after.as_millis() as u64,
                            "global rate limit hit"
                        );
                        self.global.on_global_throttle(throttle.retry_after).await;
                    } else {
                        warn!(
                            route_key = route.as_str(),
                            bucket = attempt.owner.key(),
                            retry_after_ms = throttle.retry_after.as_millis() as u64,
                            "rate limited"
                        );
                        attempt.owner.on_throttled(throttle.retry_after);
                    }
                }
                Decision::Retry { delay } => {
                    request.attempts += 1;
                    warn!(
                        route_key = route.as_str(),
                        attempt = request.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    ctx.within(TimeoutStage::Backoff, tokio::time::sleep(delay))
                        .await?;
                }
                Decision::Fail => {
                    info!(
                        route_key = route.as_str(),
                        attempts = request.attempts + 1,
                        "giving up after transient failures"
                    );
                    return self.finish(request, attempt.result).map(Tenure::Done);
                }
            }
        }
    }

    /// Turn a terminal attempt into the caller-facing result.
    fn finish(
        &self,
        request: &RequestDescriptor,
        result: std::result::Result<TransportResponse, TransportError>,
    ) -> Result<RestResponse> {
        let resp = result.map_err(Error::Transport)?;
        if resp.status.is_success() {
            return RestResponse::decode(&resp.headers, &resp.body);
        }
        let err = ErrorClassifier::classify(
            request.method(),
            request.path(),
            resp.status,
            &resp.headers,
            &resp.body,
        );
        info!(
            method = request.method().as_str(),
            path = request.path(),
            status = resp.status.as_u16(),
            error = %err,
            "request failed"
        );
        Err(err)
    }

    fn authorization(&self, request: &RequestDescriptor) -> Result<Option<String>> {
        match request.auth() {
            Auth::None => Ok(None),
            Auth::Token(token) => Ok(Some(token.clone())),
            Auth::Default => match &self.token {
                Some(token) => Ok(Some(token.to_string())),
                None => Err(Error::configuration_with_context(
                    format!(
                        "no token configured for authenticated request {} {}",
                        request.method(),
                        request.path()
                    ),
                    ErrorContext::new()
                        .with_field_path("token")
                        .with_source("rest_client"),
                )),
            },
        }
    }

    /// Submit a request and deserialize the success body.
    pub async fn request_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        self.request(request).await?.into_json()
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<RestResponse> {
        self.request(RequestDescriptor::new(Method::Get, path)).await
    }

    pub async fn post(&self, path: impl Into<String>, body: serde_json::Value) -> Result<RestResponse> {
        self.request(
            RequestDescriptor::builder(Method::Post, path)
                .json(body)
                .build()?,
        )
        .await
    }

    pub async fn patch(&self, path: impl Into<String>, body: serde_json::Value) -> Result<RestResponse> {
        self.request(
            RequestDescriptor::builder(Method::Patch, path)
                .json(body)
                .build()?,
        )
        .await
    }

    pub async fn put(&self, path: impl Into<String>) -> Result<RestResponse> {
        self.request(RequestDescriptor::new(Method::Put, path)).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> Result<RestResponse> {
        self.request(RequestDescriptor::new(Method::Delete, path)).await
    }

    /// Current scheduler state.
    pub async fn signals(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            global: self.global.snapshot().await,
            latency: self.latency.snapshot(),
            buckets: self.buckets.snapshot(),
        }
    }
}
