//! Error types
//!
//! Errors are split by how the session reacts to them:
//! - [`TransportError`] is recovered locally by the reconnect policy
//! - [`PublishError`] is reported to the caller, the session stays intact
//! - [`ValidationError`] is rejected before the transport is touched

use thiserror::Error;

pub use crate::transport::TransportError;

/// Input rejected before any transport interaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("Message must not be empty")]
    EmptyMessage,
}

/// A send that could not be handed to the transport
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Not connected")]
    NotConnected,

    #[error("Transport rejected publish: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to encode payload: {0}")]
    Serialization(String),
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Inbound payload that could not be decoded
    #[error("Malformed payload on {channel}: {message}")]
    Malformed { channel: String, message: String },
}

impl ChatError {
    /// Whether the session survives this error untouched
    pub fn is_rejection(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::Publish(_))
    }
}

impl From<ChatError> for String {
    fn from(error: ChatError) -> String {
        error.to_string()
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ChatError>;
