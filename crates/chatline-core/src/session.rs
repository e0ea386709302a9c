//! Session state owned by a single client

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::identity::Identity;
use crate::protocol::ChatEvent;
use crate::router::{MessageRouter, Target};

/// Connection lifecycle
///
/// `Disconnected -> Connecting -> Connected`, back to `Connecting` on
/// transport loss, and to `Disconnected` only on logout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    /// Correlates log lines for one login
    pub id: Uuid,
    pub identity: Option<Identity>,
    pub state: ConnectionState,
    /// Public channel, arrival order
    pub public_history: Vec<ChatEvent>,
    /// Private channel (plus local echoes), arrival order
    pub private_history: Vec<ChatEvent>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: None,
            state: ConnectionState::Disconnected,
            public_history: Vec::new(),
            private_history: Vec::new(),
        }
    }

    /// Start a fresh session for `identity`
    pub fn begin(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            state: ConnectionState::Connecting,
            ..Self::new()
        }
    }

    /// Drop identity and logs
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn visible(&self, target: &Target) -> Vec<&ChatEvent> {
        MessageRouter::visible(&self.public_history, &self.private_history, target)
    }

    /// Private conversation partners, in first-contact order
    pub fn counterparts(&self) -> Vec<&Identity> {
        let me = self.identity.as_ref();
        let mut peers: Vec<&Identity> = Vec::new();
        for event in &self.private_history {
            let peer = if Some(&event.sender) == me {
                event.receiver.as_ref()
            } else {
                Some(&event.sender)
            };
            if let Some(peer) = peer {
                if !peers.contains(&peer) {
                    peers.push(peer);
                }
            }
        }
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_begin_and_reset() {
        let mut session = Session::begin(id("alice"));
        assert_eq!(session.state, ConnectionState::Connecting);
        session.public_history.push(ChatEvent::chat(id("bob"), "hi"));

        let old_id = session.id;
        session.reset();
        assert!(session.identity.is_none());
        assert_eq!(session.state, ConnectionState::Disconnected);
        assert!(session.public_history.is_empty());
        assert_ne!(session.id, old_id);
    }

    #[test]
    fn test_counterparts() {
        let mut session = Session::begin(id("me"));
        session.private_history = vec![
            ChatEvent::private(id("me"), id("bob"), "1"),
            ChatEvent::private(id("carol"), id("me"), "2"),
            ChatEvent::private(id("bob"), id("me"), "3"),
        ];
        assert_eq!(session.counterparts(), vec![&id("bob"), &id("carol")]);
    }
}
