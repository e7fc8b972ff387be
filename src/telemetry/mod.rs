//! 审计模块：每次请求尝试的原始记录与可插拔的输出端。
//!
//! Raw request audit channel.
//!
//! Every attempt the scheduler makes, successful or not, is reported to a
//! [`RequestSink`] as a [`RawRequest`]. The sink is chosen by the application;
//! nothing is collected unless a sink is installed.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RawRequest`] | One attempt: method, path, route key, bodies, auth flag |
//! | [`RequestSink`] | Trait for audit destinations |
//! | [`NoopRequestSink`] | Default sink (no collection) |
//! | [`InMemoryRequestSink`] | Bounded in-memory sink for tests |
//! | [`TracingRequestSink`] | Emits each record as a `tracing` event |

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// One attempt against the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRequest {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub route_key: String,
    /// Zero for the first dispatch; 429 re-dispatches do not advance it.
    pub attempt: u32,
    pub auth: bool,
    pub request_body: Option<String>,
    /// `None` when the attempt never reached the server.
    pub status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait RequestSink: Send + Sync {
    async fn report(&self, record: RawRequest);
}

pub struct NoopRequestSink;

#[async_trait]
impl RequestSink for NoopRequestSink {
    async fn report(&self, _record: RawRequest) {}
}

pub fn noop_sink() -> Arc<dyn RequestSink> {
    Arc::new(NoopRequestSink)
}

/// In-memory sink for testing. Oldest records are dropped past `max`.
pub struct InMemoryRequestSink {
    records: Mutex<VecDeque<RawRequest>>,
    max_records: usize,
}

impl InMemoryRequestSink {
    pub fn new(max: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RawRequest>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn records(&self) -> Vec<RawRequest> {
        self.lock().iter().cloned().collect()
    }

    pub fn records_for_route(&self, route_key: &str) -> Vec<RawRequest> {
        self.lock()
            .iter()
            .filter(|r| r.route_key == route_key)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RequestSink for InMemoryRequestSink {
    async fn report(&self, record: RawRequest) {
        let mut records = self.lock();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
    }
}

/// Emits every record at `debug` level under the `discord_rest::raw` target.
#[derive(Default)]
pub struct TracingRequestSink;

#[async_trait]
impl RequestSink for TracingRequestSink {
    async fn report(&self, record: RawRequest) {
        tracing::debug!(
            target: "discord_rest::raw",
            id = %record.id,
            method = record.method.as_str(),
            path = record.path.as_str(),
            route_key = record.route_key.as_str(),
            attempt = record.attempt,
            auth = record.auth,
            status = record.status,
            duration_ms = record.duration_ms,
            request_body = record.request_body.as_deref(),
            response_body = record.response_body.as_deref(),
            error = record.error.as_deref(),
            "raw request"
        );
    }
}
