//! Mock HTTP server setup for integration tests

use discord_rest::config::RetryOptions;
use discord_rest::{RestClient, RestClientBuilder};
use mockito::{Mock, Server, ServerGuard};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Builder pointed at the mock server, with short retry delays.
    pub fn builder(&self) -> RestClientBuilder {
        RestClient::builder()
            .base_url(&self.base_url)
            .token("Bot mock-token")
            .retry(RetryOptions {
                max_attempts: 3,
                min_delay_ms: 10,
                max_delay_ms: 50,
                jitter: false,
            })
    }

    pub fn client(&self) -> RestClient {
        self.builder().build().expect("client builds")
    }

    /// Create a mock for a JSON response
    pub async fn mock_json(&self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock for a JSON response carrying bucket headers
    pub async fn mock_limited(
        &self,
        method: &str,
        path: &str,
        bucket: &str,
        limit: u32,
        remaining: u32,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-bucket", bucket)
            .with_header("x-ratelimit-limit", &limit.to_string())
            .with_header("x-ratelimit-remaining", &remaining.to_string())
            .with_header("x-ratelimit-reset-after", "10.000")
            .with_body("{}")
            .create_async()
            .await
    }
}
