//! Connection settings for the hosted store.
//!
//! Loaded as part of the client's TOML configuration. No defaults.

use serde::Deserialize;
use taskboard_core::OwnerId;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL of the table API, e.g. `https://project.example.co/rest/v1`.
    pub rest_url: String,
    /// Websocket URL of the change feed, e.g. `wss://project.example.co/realtime/v1/websocket`.
    pub realtime_url: String,
    /// Public project key sent as the `apikey` header.
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect: ReconnectConfig,
}

/// The signed-in user whose rows the client reads and writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub access_token: String,
    pub user_id: uuid::Uuid,
}

impl SessionConfig {
    pub fn owner(&self) -> OwnerId {
        OwnerId::new(self.user_id)
    }
}

/// Exponential backoff with jitter for realtime reconnects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}
