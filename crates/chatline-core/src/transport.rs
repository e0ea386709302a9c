//! Transport seam
//!
//! The broker connection is an external collaborator. This module defines
//! the publish/subscribe surface the session manager drives, and the
//! notifications a transport pushes back into the session's event queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Scheme used by the in-process broker
pub const MEMORY_SCHEME: &str = "memory";

/// Kind of broker endpoint, derived from the URL scheme
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// In-process broker
    Memory,
    /// WebSocket endpoint (ws:// or wss://)
    WebSocket,
    /// SockJS-style HTTP endpoint (http:// or https://)
    Http,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Memory => write!(f, "memory"),
            TransportType::WebSocket => write!(f, "websocket"),
            TransportType::Http => write!(f, "http"),
        }
    }
}

/// Configuration handed to [`Transport::connect`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportConfig {
    pub url: String,
    pub heartbeat_incoming: Duration,
    pub heartbeat_outgoing: Duration,
}

impl TransportConfig {
    /// Get the transport type from the URL scheme
    pub fn transport_type(&self) -> Result<TransportType, TransportError> {
        let scheme = self
            .url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| TransportError::InvalidConfig(format!("missing scheme in {}", self.url)))?;

        match scheme.as_str() {
            MEMORY_SCHEME => Ok(TransportType::Memory),
            "ws" | "wss" => Ok(TransportType::WebSocket),
            "http" | "https" => Ok(TransportType::Http),
            other => Err(TransportError::InvalidConfig(format!(
                "unsupported scheme: {other}"
            ))),
        }
    }

    /// Check if this points at the in-process broker
    pub fn is_memory(&self) -> bool {
        matches!(self.transport_type(), Ok(TransportType::Memory))
    }
}

/// Notification from the transport to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established, subscriptions may be armed
    Connected,
    /// Connection lost
    Disconnected { reason: Option<String> },
    /// Payload arrived on a subscribed channel
    Message { channel: String, body: String },
    /// Protocol or socket level error
    Error(String),
}

/// Item on the session's single event queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A transport notification issued under `generation`
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    /// A reconnect timer scheduled under `generation` has fired
    ReconnectDue { generation: u64 },
}

impl Signal {
    pub fn generation(&self) -> u64 {
        match self {
            Signal::Transport { generation, .. } | Signal::ReconnectDue { generation } => {
                *generation
            }
        }
    }
}

/// Handle a transport uses to push notifications into the session queue
///
/// Each connect attempt gets its own notifier stamped with the attempt's
/// generation, so notifications from superseded connections are dropped.
#[derive(Debug, Clone)]
pub struct TransportNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<Signal>,
}

impl TransportNotifier {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<Signal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns false once the session has gone away.
    pub fn notify(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Signal::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Publish/subscribe transport to a STOMP-style broker
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection. Success is signalled later with
    /// [`TransportEvent::Connected`] through `notifier`.
    async fn connect(
        &self,
        config: &TransportConfig,
        notifier: TransportNotifier,
    ) -> Result<(), TransportError>;

    /// Subscribe the current connection to `channel`
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Publish `body` to `destination`
    async fn publish(&self, destination: &str, body: &str) -> Result<(), TransportError>;

    /// Tear down the current connection, if any
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Errors that can occur with transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Transport not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<TransportError> for String {
    fn from(err: TransportError) -> String {
        err.to_string()
    }
}
