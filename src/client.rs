//! Rate-limit aware REST client.
//!
//! Keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod error_classification;
mod execution;
pub mod gateway;
mod policy;
pub mod signals;

pub use builder::RestClientBuilder;
pub use core::RestClient;
pub use error_classification::flatten_errors;
pub use gateway::{BotGatewayInfo, GatewayInfo, SessionStartLimit};
pub use signals::SignalsSnapshot;
