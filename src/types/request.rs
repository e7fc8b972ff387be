use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// HTTP methods accepted by the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::validation_with_context(
                format!("unsupported HTTP method '{}'", other),
                ErrorContext::new()
                    .with_field_path("request.method")
                    .with_source("method_parser"),
            )),
        }
    }
}

/// Authorization mode of a request.
///
/// `Default` uses the token configured on the client; `Token` overrides it for
/// this request only (e.g. an OAuth2 bearer token).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Auth {
    None,
    #[default]
    Default,
    Token(String),
}

impl Auth {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Auth::None)
    }
}

impl From<bool> for Auth {
    fn from(enabled: bool) -> Self {
        if enabled {
            Auth::Default
        } else {
            Auth::None
        }
    }
}

impl From<String> for Auth {
    fn from(token: String) -> Self {
        Auth::Token(token)
    }
}

impl From<&str> for Auth {
    fn from(token: &str) -> Self {
        Auth::Token(token.to_string())
    }
}

/// A file attachment sent as a multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub name: String,
    pub contents: Bytes,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// A form body that was already encoded by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedForm {
    /// Full content type, including the multipart boundary when there is one.
    pub content_type: String,
    pub body: Bytes,
}

impl EncodedForm {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// Request body. At most one shape is populated; the builder enforces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(EncodedForm),
    /// Files plus an optional JSON document sent as the `payload_json` part.
    Multipart {
        payload_json: Option<serde_json::Value>,
        files: Vec<File>,
    },
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// Everything the scheduler needs to perform one REST call.
///
/// Only the attempt counter and the resolved route key change after
/// construction; both are maintained by the scheduler.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    route: Option<String>,
    auth: Auth,
    body: RequestBody,
    query: Vec<(String, String)>,
    reason: Option<String>,
    priority: bool,
    timeout: Option<Duration>,
    pub(crate) route_key: Option<String>,
    pub(crate) attempts: u32,
}

impl RequestDescriptor {
    /// Authenticated request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            route: None,
            auth: Auth::Default,
            body: RequestBody::Empty,
            query: Vec::new(),
            reason: None,
            priority: false,
            timeout: None,
            route_key: None,
            attempts: 0,
        }
    }

    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Explicit route key override supplied by the caller.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_priority(&self) -> bool {
        self.priority
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Key of the bucket this request is counted against, once resolved.
    ///
    /// Starts as the resolved route key and becomes the shared `hash:major`
    /// key once a response names the server bucket.
    pub fn route_key(&self) -> Option<&str> {
        self.route_key.as_deref()
    }

    /// Number of transient-failure retries performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Builder for [`RequestDescriptor`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    route: Option<String>,
    auth: Auth,
    json: Option<serde_json::Value>,
    form: Option<EncodedForm>,
    files: Vec<File>,
    query: Vec<(String, String)>,
    reason: Option<String>,
    priority: bool,
    timeout: Option<Duration>,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            route: None,
            auth: Auth::Default,
            json: None,
            form: None,
            files: Vec::new(),
            query: Vec::new(),
            reason: None,
            priority: false,
            timeout: None,
        }
    }

    pub fn auth(mut self, auth: impl Into<Auth>) -> Self {
        self.auth = auth.into();
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn form(mut self, form: EncodedForm) -> Self {
        self.form = Some(form);
        self
    }

    pub fn file(mut self, file: File) -> Self {
        self.files.push(file);
        self
    }

    pub fn files(mut self, files: Vec<File>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Audit-log reason forwarded as `X-Audit-Log-Reason`.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Queue this request ahead of non-priority requests on its bucket.
    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    /// Override the route key the resolver would derive.
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Overall deadline for queueing and throttle waits.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<RequestDescriptor> {
        if !self.path.starts_with('/') {
            return Err(Error::validation_with_context(
                format!("request path must start with '/', got '{}'", self.path),
                ErrorContext::new()
                    .with_field_path("request.path")
                    .with_source("request_builder"),
            ));
        }

        let body = match (self.json, self.form, self.files.is_empty()) {
            (None, None, true) => RequestBody::Empty,
            (Some(json), None, true) => RequestBody::Json(json),
            (payload_json, None, false) => RequestBody::Multipart {
                payload_json,
                files: self.files,
            },
            (None, Some(form), true) => RequestBody::Form(form),
            (_, Some(_), _) => {
                return Err(Error::validation_with_context(
                    "a pre-encoded form cannot be combined with a JSON body or files",
                    ErrorContext::new()
                        .with_field_path("request.body")
                        .with_source("request_builder"),
                ));
            }
        };

        Ok(RequestDescriptor {
            method: self.method,
            path: self.path,
            route: self.route,
            auth: self.auth,
            body,
            query: self.query,
            reason: self.reason,
            priority: self.priority,
            timeout: self.timeout,
            route_key: None,
            attempts: 0,
        })
    }
}
