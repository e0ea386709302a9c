use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults;
use crate::transport::TransportConfig;

/// Client configuration
///
/// Every field has a default, so partial documents deserialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker endpoint
    pub broker_url: String,

    /// Delay before each reconnect attempt (milliseconds)
    pub reconnect_delay_ms: u64,

    /// Expected broker heartbeat interval (milliseconds, 0 disables)
    pub heartbeat_incoming_ms: u64,

    /// Client heartbeat interval (milliseconds, 0 disables)
    pub heartbeat_outgoing_ms: u64,

    /// Keep a local copy of sent private messages
    pub echo_private: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: defaults::DEFAULT_BROKER_URL.to_string(),
            reconnect_delay_ms: defaults::DEFAULT_RECONNECT_DELAY_MS,
            heartbeat_incoming_ms: defaults::DEFAULT_HEARTBEAT_INCOMING_MS,
            heartbeat_outgoing_ms: defaults::DEFAULT_HEARTBEAT_OUTGOING_MS,
            echo_private: defaults::DEFAULT_ECHO_PRIVATE,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker_url(mut self, url: impl Into<String>) -> Self {
        self.broker_url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set both heartbeat directions
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        let ms = interval.as_millis() as u64;
        self.heartbeat_incoming_ms = ms;
        self.heartbeat_outgoing_ms = ms;
        self
    }

    pub fn with_echo_private(mut self, echo: bool) -> Self {
        self.echo_private = echo;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Settings handed to the transport on every connect attempt
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.broker_url.clone(),
            heartbeat_incoming: Duration::from_millis(self.heartbeat_incoming_ms),
            heartbeat_outgoing: Duration::from_millis(self.heartbeat_outgoing_ms),
        }
    }
}
