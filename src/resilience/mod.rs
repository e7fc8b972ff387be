//! 限流模块：路由键解析、按桶排队与全局限流。
//!
//! # Rate-Limit Primitives
//!
//! The building blocks the scheduler composes for every request:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`route_key`] | Maps method + path to the bucket a request is counted against |
//! | [`bucket`] | Per-route queue and budget; one dispatch at a time |
//! | [`registry`] | Lazily created buckets, merged once the server names them |
//! | [`global`] | Application-wide concurrency ceiling, dispatch rate, and global 429 freeze |
//! | [`headers`] | Parsing of rate-limit response headers and 429 bodies |
//! | [`latency`] | Rolling round-trip time and server clock offset |
//!
//! ```rust
//! use discord_rest::resilience::route_key::RouteKeyResolver;
//! use discord_rest::types::Method;
//!
//! let key = RouteKeyResolver::new().resolve(Method::Get, "/channels/123/messages/456");
//! assert_eq!(key.as_str(), "GET /channels/123/messages/:id");
//! assert_eq!(key.major(), Some("123"));
//! ```

pub mod bucket;
pub mod global;
pub mod headers;
pub mod latency;
pub mod registry;
pub mod route_key;

pub use bucket::{BucketPhase, BucketSnapshot, RateLimitBucket};
pub use global::{GlobalLimiter, GlobalSnapshot};
pub use headers::{RateLimitHeaders, RateLimitScope, Throttle};
pub use latency::{LatencySnapshot, LatencyTracker};
pub use registry::BucketRegistry;
pub use route_key::{RouteKey, RouteKeyResolver};
