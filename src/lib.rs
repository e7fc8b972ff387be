//! # discord-rest-rs
//!
//! 面向 Discord HTTP API 的限流感知 REST 调度器。
//!
//! Rate-limit aware REST scheduler for the Discord HTTP API.
//!
//! ## Overview
//!
//! Every request is counted against a bucket derived from its method and path.
//! The client queues requests per bucket, dispatches them one at a time within
//! the budget the server reports, absorbs 429s (per-route and global) by
//! waiting, retries transient failures with backoff, and hands callers either a
//! decoded body or a single terminal error.
//!
//! ## Key Features
//!
//! - **Per-bucket queues**: priority-then-FIFO dispatch, one in flight per bucket
//! - **Bucket discovery**: provisional route keys merge into server-named buckets
//! - **Global gate**: concurrency ceiling, optional dispatch rate, global 429 freeze
//! - **Deadlines**: caller timeouts reported distinctly from network or server errors
//! - **Audit channel**: one [`telemetry::RawRequest`] per attempt via a pluggable sink
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use discord_rest::{Method, RequestDescriptor, RestClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> discord_rest::Result<()> {
//!     let client = RestClient::builder()
//!         .token("Bot your-token")
//!         .build()?;
//!
//!     let request = RequestDescriptor::builder(Method::Post, "/channels/123456789012345678/messages")
//!         .json(json!({ "content": "hello" }))
//!         .build()?;
//!     let message = client.request(request).await?;
//!     println!("{:?}", message);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client, builder, retry policy and error classification |
//! | [`resilience`] | Route keys, buckets, global limiter, header parsing |
//! | [`transport`] | Single-attempt HTTP seam and the reqwest implementation |
//! | [`telemetry`] | Raw request audit records and sinks |
//! | [`types`] | Request descriptors and response bodies |
//! | [`config`] | Options, YAML loading and defaults |

pub mod client;
pub mod config;
pub mod resilience;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{RestClient, RestClientBuilder, SignalsSnapshot};
pub use config::{RestOptions, RetryOptions};
pub use telemetry::{RawRequest, RequestSink};
pub use types::{Auth, File, Method, RequestDescriptor, RestResponse};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind, ErrorSnapshot, HttpError, RestError, TimeoutStage};
