//! 传输层：单次 HTTP 调用的抽象与 reqwest 实现。
//!
//! # Transport
//!
//! The scheduler never talks to the network directly. Every attempt is turned
//! into a [`PreparedRequest`] (headers, serialized body, query) and handed to a
//! [`Transport`]. [`HttpTransport`] is the production implementation; tests
//! plug in scripted transports to observe dispatch order and timing.

mod http;

pub use http::HttpTransport;

use crate::types::{File, Method};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request exceeded the transport timeout of {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Serialized body of one attempt.
#[derive(Debug, Clone)]
pub enum PreparedBody {
    Empty,
    Json(Bytes),
    /// Pre-encoded form sent verbatim.
    Encoded { content_type: String, body: Bytes },
    /// Built into a multipart form by the transport on every attempt.
    Multipart {
        payload_json: Option<String>,
        files: Vec<File>,
    },
}

impl PreparedBody {
    /// Printable form of the outbound body for the audit record.
    pub fn describe(&self) -> Option<String> {
        match self {
            PreparedBody::Empty => None,
            PreparedBody::Json(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            PreparedBody::Encoded { content_type, body } => {
                Some(format!("<{} bytes of {}>", body.len(), content_type))
            }
            PreparedBody::Multipart {
                payload_json,
                files,
            } => {
                let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
                Some(format!(
                    "multipart(payload_json={}, files=[{}])",
                    payload_json.as_deref().unwrap_or("null"),
                    names.join(", ")
                ))
            }
        }
    }
}

/// One attempt, fully materialized.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    pub route_key: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: PreparedBody,
}

/// Raw outcome of an attempt that reached the server.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs a single network call. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError>;
}
