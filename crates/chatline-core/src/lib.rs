//! Chatline Core Library
//!
//! Presence-aware chat sessions over a STOMP-style publish/subscribe
//! broker. The broker connection itself is an external collaborator behind
//! the [`Transport`] trait; this crate owns everything on the client side
//! of it.
//!
//! # Modules
//!
//! - [`client`] - Session manager: connect, logout, send, event processing
//! - [`router`] - Outbound envelope building and inbound classification
//! - [`presence`] - Online-user snapshots
//! - [`reconnect`] - Reconnect timer and retry policy
//! - [`session`] - Session state and message logs
//! - [`protocol`] - Payload types and channel names
//! - [`identity`] - Usernames
//! - [`transport`] - Transport seam and notifications
//! - [`memory`] - In-process broker and transport
//! - [`events`] - Event sink trait for decoupling from frontends
//! - [`config`] - Client configuration
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod memory;
pub mod presence;
pub mod protocol;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use client::{ChatClient, ChatUpdate};
pub use config::ClientConfig;
pub use error::{ChatError, PublishError, Result, ValidationError};
pub use events::{EventSink, NoOpEventSink, StdoutEventSink};
pub use identity::{generate_username, Identity};
pub use memory::{MemoryBroker, MemoryTransport};
pub use presence::PresenceTracker;
pub use protocol::{channel, ChatEvent, MessageKind};
pub use reconnect::ReconnectPolicy;
pub use router::{MessageRouter, Target};
pub use session::{ConnectionState, Session};
pub use transport::{Signal, Transport, TransportConfig, TransportError, TransportEvent, TransportNotifier};
