//! 类型模块：请求描述与响应解码的核心数据类型。
//!
//! # Types Module
//!
//! Value types exchanged between callers and the scheduler.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestDescriptor`] | Everything the scheduler needs to perform one REST call |
//! | [`RequestBody`] | Tagged body variant (JSON, pre-encoded form, multipart files) |
//! | [`Auth`] | Whether and how the `Authorization` header is attached |
//! | [`RestResponse`] | Decoded success body (`NoContent`, JSON or text) |
//!
//! ## Example
//!
//! ```rust
//! use discord_rest::types::{Method, RequestDescriptor};
//! use serde_json::json;
//!
//! let request = RequestDescriptor::builder(Method::Post, "/channels/123456789012345678/messages")
//!     .json(json!({ "content": "hello" }))
//!     .reason("greeting")
//!     .build()
//!     .unwrap();
//! assert!(request.auth().is_enabled());
//! ```

pub mod request;
pub mod response;

pub use request::{Auth, EncodedForm, File, Method, RequestBody, RequestBuilder, RequestDescriptor};
pub use response::RestResponse;
