//! Integration tests with mock HTTP server

pub mod http;
pub mod mock_server;
