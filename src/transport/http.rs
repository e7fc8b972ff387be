use super::{PreparedBody, PreparedRequest, Transport, TransportError, TransportResponse};
use crate::config::RestOptions;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Proxy;
use std::env;
use std::time::Duration;

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(options: &RestOptions) -> Result<Self> {
        // Env overrides take precedence over options.
        let timeout_ms = env::var("DISCORD_REST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(options.request_timeout_ms);
        let timeout = Duration::from_millis(timeout_ms.max(1));

        let base_url = env::var("DISCORD_REST_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| options.base_url.clone());

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(options.user_agent.clone())
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("DISCORD_REST_PROXY_URL") {
            let proxy = Proxy::all(&proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url: {}", e),
                    ErrorContext::new()
                        .with_field_path("DISCORD_REST_PROXY_URL")
                        .with_source("http_transport"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn multipart(
        payload_json: Option<String>,
        files: Vec<crate::types::File>,
    ) -> std::result::Result<Form, TransportError> {
        let mut form = Form::new();
        if let Some(json) = payload_json {
            form = form.part("payload_json", Part::text(json).mime_str("application/json")?);
        }
        for (index, file) in files.into_iter().enumerate() {
            let part = Part::bytes(file.contents.to_vec()).file_name(file.name);
            form = form.part(format!("files[{}]", index), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: PreparedRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.body {
            PreparedBody::Empty => builder,
            PreparedBody::Json(bytes) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(bytes),
            PreparedBody::Encoded { content_type, body } => {
                builder.header(CONTENT_TYPE, content_type).body(body)
            }
            PreparedBody::Multipart {
                payload_json,
                files,
            } => builder.multipart(Self::multipart(payload_json, files)?),
        };

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Http(e)
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Http(e)
            }
        })?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
