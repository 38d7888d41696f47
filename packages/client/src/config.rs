//! Client configuration.

use std::time::Duration;

use crate::{stomp::HeartBeat, types::UserId};

/// Default broker endpoint
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";
/// Fixed delay between reconnection attempts
pub const RECONNECT_INTERVAL_SECS: u64 = 5;
/// Time allowed for the broker to answer CONNECT
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Heart-beat interval offered in both directions
pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// Settings of one messaging client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the broker
    pub endpoint: String,
    /// The authenticated user whose personal queues are subscribed
    pub user_id: UserId,
    /// Bearer token sent with CONNECT
    pub auth_token: Option<String>,
    /// Delay before each reconnection attempt
    pub retry_delay: Duration,
    pub handshake_timeout: Duration,
    pub heart_beat: HeartBeat,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, user_id: UserId) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_id,
            auth_token: None,
            retry_delay: Duration::from_secs(RECONNECT_INTERVAL_SECS),
            handshake_timeout: Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            heart_beat: HeartBeat::new(HEARTBEAT_INTERVAL_MS, HEARTBEAT_INTERVAL_MS),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_heart_beat(mut self, heart_beat: HeartBeat) -> Self {
        self.heart_beat = heart_beat;
        self
    }

    /// `host:port` part of the endpoint, sent as the STOMP `host` header
    pub fn host(&self) -> &str {
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint);
        without_scheme
            .split(['/', '?'])
            .next()
            .unwrap_or(without_scheme)
    }
}
