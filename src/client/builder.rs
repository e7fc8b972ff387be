use crate::client::core::RestClient;
use crate::client::policy::PolicyEngine;
use crate::config::{RestOptions, RetryOptions};
use crate::resilience::{BucketRegistry, GlobalLimiter, LatencyTracker, RouteKeyResolver};
use crate::telemetry::RequestSink;
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable.
pub struct RestClientBuilder {
    token: Option<String>,
    options: RestOptions,
    transport: Option<Arc<dyn Transport>>,
    sink: Arc<dyn RequestSink>,
}

impl RestClientBuilder {
    pub fn new() -> Self {
        Self {
            token: None,
            options: RestOptions::default(),
            transport: None,
            sink: crate::telemetry::noop_sink(),
        }
    }

    /// Default `Authorization` value, sent verbatim (e.g. `"Bot <token>"`).
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn options(mut self, options: RestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.options.base_url = base_url.into();
        self
    }

    /// Limit the number of requests outstanding at once, across all buckets.
    pub fn max_inflight(mut self, n: usize) -> Self {
        self.options.max_inflight = Some(n.max(1));
        self
    }

    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.options.requests_per_second = Some(rps);
        self
    }

    /// Deadline for requests that do not set their own.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.options.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.options.retry = retry;
        self
    }

    /// Replace the HTTP transport. Primarily for tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject a raw request sink. Default is a no-op sink.
    pub fn request_sink(mut self, sink: Arc<dyn RequestSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Result<RestClient> {
        let mut options = self.options;
        if options.max_inflight.is_none() {
            options.max_inflight = std::env::var("DISCORD_REST_MAX_INFLIGHT")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0);
        }
        options.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&options)?),
        };

        Ok(RestClient {
            token: self.token.map(Arc::from),
            transport,
            buckets: Arc::new(BucketRegistry::new()),
            global: Arc::new(GlobalLimiter::new(
                options.max_inflight,
                options.requests_per_second,
            )),
            latency: Arc::new(LatencyTracker::new()),
            resolver: RouteKeyResolver::new(),
            policy: Arc::new(PolicyEngine::new(&options.retry)),
            sink: self.sink,
            options: Arc::new(options),
        })
    }
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
