//! Gateway discovery, the only endpoints the client calls on its own behalf.

use crate::client::core::RestClient;
use crate::types::{Auth, Method, RequestDescriptor};
use crate::Result;
use serde::{Deserialize, Serialize};

pub const GATEWAY: &str = "/gateway";
pub const GATEWAY_BOT: &str = "/gateway/bot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    pub reset_after: u64,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: u32,
}

fn default_concurrency() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotGatewayInfo {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

impl RestClient {
    /// `GET /gateway`. Unauthenticated.
    pub async fn get_gateway(&self) -> Result<GatewayInfo> {
        self.request_json(
            RequestDescriptor::builder(Method::Get, GATEWAY)
                .auth(Auth::None)
                .build()?,
        )
        .await
    }

    /// `GET /gateway/bot`, with the recommended shard count.
    pub async fn get_bot_gateway(&self) -> Result<BotGatewayInfo> {
        self.request_json(RequestDescriptor::new(Method::Get, GATEWAY_BOT))
            .await
    }
}
