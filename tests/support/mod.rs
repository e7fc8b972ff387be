//! Scripted in-memory transport for scheduler tests.
//!
//! Replies are queued per path and consumed in order; every dispatch is
//! logged with the (paused) tokio clock so tests can assert on timing.

#![allow(dead_code)]

use async_trait::async_trait;
use discord_rest::config::RetryOptions;
use discord_rest::telemetry::InMemoryRequestSink;
use discord_rest::transport::{PreparedRequest, Transport, TransportError, TransportResponse};
use discord_rest::{Method, RestClient, RestClientBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    delay: Duration,
    network_error: bool,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::status(200).body(body).header("content-type", "application/json")
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: Duration::ZERO,
            network_error: false,
        }
    }

    pub fn network_error() -> Self {
        Self {
            network_error: true,
            ..Self::status(0)
        }
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// `x-ratelimit-*` headers for a known bucket.
    pub fn limits(self, limit: u32, remaining: i64, reset_after: f64) -> Self {
        self.header("x-ratelimit-limit", &limit.to_string())
            .header("x-ratelimit-remaining", &remaining.to_string())
            .header("x-ratelimit-reset-after", &reset_after.to_string())
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Dispatch {
    pub method: Method,
    pub path: String,
    pub route_key: String,
    pub headers: HeaderMap,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct State {
    script: HashMap<String, VecDeque<Reply>>,
    log: Vec<Dispatch>,
    inflight: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<State>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue replies for `path`. Unscripted paths answer `200 {}`.
    pub fn script(&self, path: &str, replies: Vec<Reply>) {
        self.state
            .lock()
            .unwrap()
            .script
            .entry(path.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn dispatches_for(&self, path: &str) -> Vec<Dispatch> {
        self.dispatches()
            .into_iter()
            .filter(|d| d.path == path)
            .collect()
    }

    /// Highest number of simultaneous calls seen on `path`.
    pub fn peak_inflight(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .peak
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError> {
        let started = Instant::now();
        let reply = {
            let mut st = self.state.lock().unwrap();
            let count = st.inflight.entry(request.path.clone()).or_insert(0);
            *count += 1;
            let now = *count;
            let peak = st.peak.entry(request.path.clone()).or_insert(0);
            *peak = (*peak).max(now);
            st.script
                .get_mut(&request.path)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| Reply::ok("{}"))
        };

        tokio::time::sleep(reply.delay).await;

        {
            let mut st = self.state.lock().unwrap();
            if let Some(count) = st.inflight.get_mut(&request.path) {
                *count -= 1;
            }
            st.log.push(Dispatch {
                method: request.method,
                path: request.path.clone(),
                route_key: request.route_key.clone(),
                headers: request.headers.clone(),
                started,
                finished: Instant::now(),
            });
        }

        if reply.network_error {
            return Err(TransportError::Other("connection reset by peer".into()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &reply.headers {
            headers.insert(
                HeaderName::from_str(name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        Ok(TransportResponse {
            status: StatusCode::from_u16(reply.status).unwrap(),
            headers,
            body: reply.body.clone().into(),
        })
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryOptions {
    RetryOptions {
        max_attempts,
        min_delay_ms: 100,
        max_delay_ms: 1_000,
        jitter: false,
    }
}

/// Route scheduler logs to the test writer; `RUST_LOG=discord_rest=trace` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn builder(transport: &Arc<ScriptedTransport>) -> RestClientBuilder {
    init_tracing();
    RestClient::builder()
        .token("Bot test-token")
        .transport(transport.clone())
        .retry(fast_retry(3))
}

pub fn client(transport: &Arc<ScriptedTransport>) -> RestClient {
    builder(transport).build().unwrap()
}

pub fn client_with_sink(
    transport: &Arc<ScriptedTransport>,
) -> (RestClient, Arc<InMemoryRequestSink>) {
    let sink = Arc::new(InMemoryRequestSink::new(100));
    let client = builder(transport)
        .request_sink(sink.clone())
        .build()
        .unwrap();
    (client, sink)
}
