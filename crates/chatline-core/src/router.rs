//! Message routing
//!
//! Builds outbound envelopes (public vs. private), classifies inbound
//! payloads by channel, and derives the visible conversation for a target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChatError, PublishError, Result, ValidationError};
use crate::identity::Identity;
use crate::protocol::{channel, ChatEvent, Envelope, PresenceNotice};

/// Sentinel name for the public conversation
pub const PUBLIC_TARGET: &str = "public";

/// Where an outgoing message goes, and which conversation is on display
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Public,
    User(Identity),
}

impl Target {
    pub fn is_public(&self) -> bool {
        matches!(self, Target::Public)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Public => f.write_str(PUBLIC_TARGET),
            Target::User(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Target {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == PUBLIC_TARGET {
            return Ok(Target::Public);
        }
        Identity::parse(trimmed).map(Target::User)
    }
}

impl From<Identity> for Target {
    fn from(id: Identity) -> Self {
        Target::User(id)
    }
}

/// Classified inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Public(ChatEvent),
    Private(ChatEvent),
    Presence(Vec<Identity>),
    /// Arrived on a channel this client never subscribes to
    Unrouted(String),
}

/// Stateless routing rules
pub struct MessageRouter;

impl MessageRouter {
    /// Build the event and envelope for a user message.
    ///
    /// Public targets produce CHAT with no receiver on the public send
    /// channel; user targets produce PRIVATE on the private send channel.
    pub fn outbound(sender: &Identity, content: &str, target: &Target) -> Result<(ChatEvent, Envelope)> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let (event, destination) = match target {
            Target::Public => (
                ChatEvent::chat(sender.clone(), content),
                channel::SEND_PUBLIC,
            ),
            Target::User(receiver) => (
                ChatEvent::private(sender.clone(), receiver.clone(), content),
                channel::SEND_PRIVATE,
            ),
        };

        let envelope = Envelope::encode(destination, &event).map_err(PublishError::from)?;
        Ok((event, envelope))
    }

    /// Registration (JOIN) envelope
    pub fn register(sender: &Identity) -> Result<Envelope> {
        Envelope::encode(channel::REGISTER, &PresenceNotice::join(sender.clone()))
            .map_err(|e| PublishError::from(e).into())
    }

    /// Leave (LEAVE) envelope
    pub fn leave(sender: &Identity) -> Result<Envelope> {
        Envelope::encode(channel::LEAVE, &PresenceNotice::leave(sender.clone()))
            .map_err(|e| PublishError::from(e).into())
    }

    /// Classify an inbound payload by the channel it arrived on
    pub fn classify(channel_name: &str, body: &str) -> Result<Inbound> {
        let malformed = |message: String| ChatError::Malformed {
            channel: channel_name.to_string(),
            message,
        };

        match channel_name {
            channel::TOPIC_PUBLIC => ChatEvent::decode(body).map(Inbound::Public).map_err(malformed),
            channel::QUEUE_PRIVATE => ChatEvent::decode(body).map(Inbound::Private).map_err(malformed),
            channel::TOPIC_USERS => serde_json::from_str::<Vec<Identity>>(body)
                .map(Inbound::Presence)
                .map_err(|e| malformed(e.to_string())),
            other => Ok(Inbound::Unrouted(other.to_string())),
        }
    }

    /// Events visible for `target`: public history verbatim, or the
    /// private events exchanged with that user in either direction.
    pub fn visible<'a>(
        public: &'a [ChatEvent],
        private: &'a [ChatEvent],
        target: &Target,
    ) -> Vec<&'a ChatEvent> {
        match target {
            Target::Public => public.iter().collect(),
            Target::User(peer) => private.iter().filter(|e| e.involves(peer)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn test_target_parse() {
        assert_eq!("public".parse::<Target>().unwrap(), Target::Public);
        assert_eq!(" bob ".parse::<Target>().unwrap(), Target::User(id("bob")));
        assert!("   ".parse::<Target>().is_err());
        assert_eq!(Target::User(id("bob")).to_string(), "bob");
        assert_eq!(Target::default(), Target::Public);
    }

    #[test]
    fn test_outbound_public() {
        let (event, envelope) = MessageRouter::outbound(&id("alice"), "hello", &Target::Public).unwrap();
        assert_eq!(event.kind, MessageKind::Chat);
        assert!(event.receiver.is_none());
        assert_eq!(envelope.destination, channel::SEND_PUBLIC);

        let body: serde_json::Value = serde_json::from_str(&envelope.body).unwrap();
        assert_eq!(body["type"], "CHAT");
        assert!(body["receiver"].is_null());
        assert_eq!(body["content"], "hello");
    }

    #[test]
    fn test_outbound_private() {
        let target = Target::User(id("bob"));
        let (event, envelope) = MessageRouter::outbound(&id("alice"), "psst", &target).unwrap();
        assert_eq!(event.kind, MessageKind::Private);
        assert_eq!(event.receiver, Some(id("bob")));
        assert_eq!(envelope.destination, channel::SEND_PRIVATE);

        let body: serde_json::Value = serde_json::from_str(&envelope.body).unwrap();
        assert_eq!(body["type"], "PRIVATE");
        assert_eq!(body["receiver"], "bob");
    }

    #[test]
    fn test_outbound_rejects_blank() {
        for content in ["", "   ", "\n\t"] {
            let err = MessageRouter::outbound(&id("alice"), content, &Target::Public).unwrap_err();
            assert!(matches!(err, ChatError::Validation(ValidationError::EmptyMessage)));
        }
    }

    #[test]
    fn test_register_and_leave() {
        let join = MessageRouter::register(&id("alice")).unwrap();
        assert_eq!(join.destination, channel::REGISTER);
        assert!(join.body.contains("\"JOIN\""));

        let leave = MessageRouter::leave(&id("alice")).unwrap();
        assert_eq!(leave.destination, channel::LEAVE);
        assert!(leave.body.contains("\"LEAVE\""));
    }

    #[test]
    fn test_classify() {
        let body = r#"{"sender":"bob","content":"hi","type":"CHAT","receiver":null}"#;
        assert!(matches!(
            MessageRouter::classify(channel::TOPIC_PUBLIC, body).unwrap(),
            Inbound::Public(_)
        ));

        let body = r#"{"sender":"bob","content":"hi","type":"PRIVATE","receiver":"alice"}"#;
        assert!(matches!(
            MessageRouter::classify(channel::QUEUE_PRIVATE, body).unwrap(),
            Inbound::Private(_)
        ));

        assert_eq!(
            MessageRouter::classify(channel::TOPIC_USERS, r#"["a","b"]"#).unwrap(),
            Inbound::Presence(vec![id("a"), id("b")])
        );

        assert_eq!(
            MessageRouter::classify("/topic/other", "{}").unwrap(),
            Inbound::Unrouted("/topic/other".to_string())
        );
    }

    #[test]
    fn test_classify_malformed() {
        let err = MessageRouter::classify(channel::TOPIC_USERS, "{\"a\":1}").unwrap_err();
        match err {
            ChatError::Malformed { channel, .. } => assert_eq!(channel, "/topic/users"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_visible_private_filter() {
        let private = vec![
            ChatEvent::private(id("a"), id("b"), "one"),
            ChatEvent::private(id("c"), id("d"), "two"),
        ];
        let visible = MessageRouter::visible(&[], &private, &Target::User(id("b")));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, "one");
    }

    #[test]
    fn test_visible_both_directions() {
        let private = vec![
            ChatEvent::private(id("me"), id("bob"), "out"),
            ChatEvent::private(id("carol"), id("me"), "other"),
            ChatEvent::private(id("bob"), id("me"), "in"),
        ];
        let visible = MessageRouter::visible(&[], &private, &Target::User(id("bob")));
        let contents: Vec<&str> = visible.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["out", "in"]);
    }

    #[test]
    fn test_visible_public_verbatim() {
        let public = vec![
            ChatEvent::chat(id("a"), "1"),
            ChatEvent::chat(id("b"), "2"),
        ];
        let private = vec![ChatEvent::private(id("a"), id("b"), "x")];
        let visible = MessageRouter::visible(&public, &private, &Target::Public);
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].content, "2");
    }
}
