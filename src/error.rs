use crate::transport::TransportError;
use crate::types::Method;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "options.base_url", "request.body")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "request_builder", "options_loader")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a request was waiting when its deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStage {
    /// Waiting for its turn in the bucket queue.
    Queued,
    /// Waiting for a bucket reset or a 429 `retry_after`.
    RateLimited,
    /// Waiting on the application-wide limiter.
    GlobalLimit,
    /// Sleeping between transient-failure retries.
    Backoff,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeoutStage::Queued => "queued",
            TimeoutStage::RateLimited => "rate limited",
            TimeoutStage::GlobalLimit => "global limit",
            TimeoutStage::Backoff => "retry backoff",
        };
        f.write_str(s)
    }
}

/// Coarse classification for callers that only need to branch on the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller's deadline elapsed before a terminal response.
    Timeout,
    /// Connection or transport failure after exhausting retries.
    Network,
    /// 5xx after exhausting retries.
    Server,
    /// 4xx rejected by the API.
    Client,
    /// Invalid request, options, or runtime misuse.
    Usage,
    /// A success body could not be decoded.
    Decode,
}

/// Unified error type for the REST scheduler.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Request timed out after {waited_ms}ms ({stage}) on {method} {path}")]
    Timeout {
        method: Method,
        path: String,
        stage: TimeoutStage,
        waited_ms: u128,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Network,
            Error::Http(e) if e.status.is_server_error() => ErrorKind::Server,
            Error::Rest(e) if e.http.status.is_server_error() => ErrorKind::Server,
            Error::Http(_) | Error::Rest(_) => ErrorKind::Client,
            Error::Serialization(_) => ErrorKind::Decode,
            Error::Configuration { .. } | Error::Validation { .. } => ErrorKind::Usage,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// HTTP status of the terminal response, when the error came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http(e) => Some(e.status),
            Error::Rest(e) => Some(e.http.status),
            _ => None,
        }
    }
}

/// A non-success response without a vendor error code.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub method: Method,
    pub path: String,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Parsed body when it was JSON, otherwise the raw text as a JSON string.
    pub body: Option<serde_json::Value>,
    pub message: String,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot::from_parts("HttpError", self, None)
    }
}

/// A non-success response carrying a vendor error code and optional field errors.
#[derive(Debug, Clone)]
pub struct RestError {
    pub http: HttpError,
    pub code: i64,
    /// Flattened field errors, one `"path: message"` entry each.
    pub field_errors: Vec<String>,
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.http.message)
    }
}

impl std::error::Error for RestError {}

impl RestError {
    pub fn method(&self) -> Method {
        self.http.method
    }

    pub fn path(&self) -> &str {
        &self.http.path
    }

    pub fn status(&self) -> StatusCode {
        self.http.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.http.headers
    }

    pub fn message(&self) -> &str {
        &self.http.message
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot::from_parts("RestError", &self.http, Some(self))
    }
}

/// Plain field-by-field record of an HTTP-level error, for structured logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSnapshot {
    pub name: &'static str,
    pub message: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub status_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub response_body: Option<serde_json::Value>,
}

impl ErrorSnapshot {
    fn from_parts(name: &'static str, http: &HttpError, rest: Option<&RestError>) -> Self {
        let headers = http
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        Self {
            name,
            message: http.message.clone(),
            method: http.method.to_string(),
            path: http.path.clone(),
            status: http.status.as_u16(),
            status_text: http.status_text.clone(),
            code: rest.map(|r| r.code),
            field_errors: rest.map(|r| r.field_errors.clone()).unwrap_or_default(),
            headers,
            response_body: http.body.clone(),
        }
    }
}
