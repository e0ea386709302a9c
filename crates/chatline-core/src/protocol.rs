//! Chat protocol types
//!
//! Payload shapes and channel names shared with the broker. These must
//! stay wire compatible with existing STOMP chat servers: field names,
//! the upper-case `type` tag, and the destinations below are fixed.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::identity::Identity;

/// Broker destinations and subscription channels
pub mod channel {
    /// Outbound registration (JOIN)
    pub const REGISTER: &str = "/app/chat.register";
    /// Outbound leave (LEAVE)
    pub const LEAVE: &str = "/app/chat.leave";
    /// Outbound public message
    pub const SEND_PUBLIC: &str = "/app/chat.send";
    /// Outbound private message
    pub const SEND_PRIVATE: &str = "/app/chat.private";

    /// Inbound public messages and JOIN/LEAVE notices
    pub const TOPIC_PUBLIC: &str = "/topic/public";
    /// Inbound private messages addressed to this user
    pub const QUEUE_PRIVATE: &str = "/user/queue/private";
    /// Inbound presence snapshots
    pub const TOPIC_USERS: &str = "/topic/users";

    /// Channels armed on every successful connect
    pub const SUBSCRIPTIONS: [&str; 3] = [TOPIC_PUBLIC, QUEUE_PRIVATE, TOPIC_USERS];
}

/// Kind of chat event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Join,
    Leave,
    Chat,
    Private,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Join => write!(f, "JOIN"),
            MessageKind::Leave => write!(f, "LEAVE"),
            MessageKind::Chat => write!(f, "CHAT"),
            MessageKind::Private => write!(f, "PRIVATE"),
        }
    }
}

/// A chat event as carried on the public and private channels
///
/// PRIVATE events always carry a receiver; every other kind has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub sender: Identity,
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "optional_identity")]
    pub receiver: Option<Identity>,
    #[serde(
        default = "Utc::now",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    /// Public broadcast message
    pub fn chat(sender: Identity, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            kind: MessageKind::Chat,
            receiver: None,
            timestamp: Utc::now(),
        }
    }

    /// One-to-one message
    pub fn private(sender: Identity, receiver: Identity, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            kind: MessageKind::Private,
            receiver: Some(receiver),
            timestamp: Utc::now(),
        }
    }

    /// Decode an inbound payload, enforcing the receiver invariant
    pub fn decode(body: &str) -> Result<Self, String> {
        let mut event: ChatEvent = serde_json::from_str(body).map_err(|e| e.to_string())?;
        match event.kind {
            MessageKind::Private if event.receiver.is_none() => {
                Err("PRIVATE event without receiver".to_string())
            }
            MessageKind::Private => Ok(event),
            _ => {
                event.receiver = None;
                Ok(event)
            }
        }
    }

    /// Whether this event belongs to the one-to-one conversation with `peer`
    pub fn involves(&self, peer: &Identity) -> bool {
        &self.sender == peer || self.receiver.as_ref() == Some(peer)
    }
}

/// JOIN/LEAVE payload: no content, no receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceNotice {
    pub sender: Identity,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl PresenceNotice {
    pub fn join(sender: Identity) -> Self {
        Self {
            sender,
            kind: MessageKind::Join,
            timestamp: Utc::now(),
        }
    }

    pub fn leave(sender: Identity) -> Self {
        Self {
            sender,
            kind: MessageKind::Leave,
            timestamp: Utc::now(),
        }
    }
}

/// A payload ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub destination: &'static str,
    pub body: String,
}

impl Envelope {
    pub fn encode<T: Serialize>(
        destination: &'static str,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            destination,
            body: serde_json::to_string(payload)?,
        })
    }
}

/// Parse a broker timestamp.
///
/// Accepts RFC 3339 with an offset, or a zone-less ISO local date-time
/// which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()),
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    match raw {
        Some(raw) => parse_timestamp(&raw).map_err(serde::de::Error::custom),
        None => Ok(Utc::now()),
    }
}

/// A blank receiver is the same as no receiver
fn optional_identity<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Identity>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.and_then(|raw| Identity::parse(&raw).ok()))
}

fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn test_kind_serde() {
        assert_eq!(serde_json::to_string(&MessageKind::Private).unwrap(), "\"PRIVATE\"");
        let parsed: MessageKind = serde_json::from_str("\"JOIN\"").unwrap();
        assert_eq!(parsed, MessageKind::Join);
        assert_eq!(MessageKind::Leave.to_string(), "LEAVE");
    }

    #[test]
    fn test_chat_payload_shape() {
        let mut event = ChatEvent::chat(id("alice"), "hi");
        event.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "sender": "alice",
                "content": "hi",
                "type": "CHAT",
                "receiver": null,
                "timestamp": "2024-05-01T12:00:00.000Z"
            })
        );
    }

    #[test]
    fn test_private_payload_shape() {
        let event = ChatEvent::private(id("alice"), id("bob"), "psst");
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "PRIVATE");
        assert_eq!(value["receiver"], "bob");
    }

    #[test]
    fn test_presence_notice_shape() {
        let notice = PresenceNotice::join(id("alice"));
        let value: serde_json::Value = serde_json::to_value(&notice).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["sender"], "alice");
        assert_eq!(obj["type"], "JOIN");
        assert!(obj.contains_key("timestamp"));

        let leave = PresenceNotice::leave(id("alice"));
        assert_eq!(leave.kind, MessageKind::Leave);
    }

    #[test]
    fn test_decode_server_join() {
        // Zone-less local time, no receiver field
        let body = r#"{"sender":"bob","content":"bob joined the chat!","type":"JOIN","timestamp":"2024-05-01T09:30:15.123456"}"#;
        let event = ChatEvent::decode(body).unwrap();
        assert_eq!(event.sender, "bob");
        assert_eq!(event.kind, MessageKind::Join);
        assert!(event.receiver.is_none());
        assert_eq!(
            event.timestamp,
            parse_timestamp("2024-05-01T09:30:15.123456Z").unwrap()
        );
    }

    #[test]
    fn test_decode_tolerates_nulls() {
        let body = r#"{"sender":"bob","content":null,"type":"LEAVE","receiver":null,"timestamp":null}"#;
        let event = ChatEvent::decode(body).unwrap();
        assert_eq!(event.content, "");
        assert_eq!(event.kind, MessageKind::Leave);
    }

    #[test]
    fn test_decode_enforces_receiver_invariant() {
        let body = r#"{"sender":"bob","content":"x","type":"PRIVATE","receiver":null}"#;
        assert!(ChatEvent::decode(body).is_err());

        let body = r#"{"sender":"bob","content":"x","type":"CHAT","receiver":"carol"}"#;
        let event = ChatEvent::decode(body).unwrap();
        assert!(event.receiver.is_none());
    }

    #[test]
    fn test_decode_validates_identities() {
        let body = r#"{"sender":"","content":"x","type":"CHAT"}"#;
        assert!(ChatEvent::decode(body).is_err());

        let body = r#"{"sender":"bob","content":"x","type":"PRIVATE","receiver":"   "}"#;
        assert!(ChatEvent::decode(body).is_err());

        let body = r#"{"sender":" bob ","content":"x","type":"PRIVATE","receiver":" carol"}"#;
        let event = ChatEvent::decode(body).unwrap();
        assert_eq!(event.sender, id("bob"));
        assert_eq!(event.receiver, Some(id("carol")));
        assert!(event.involves(&id("bob")));

        let body = r#"{"sender":"bob","content":"x","type":"CHAT","receiver":""}"#;
        assert!(ChatEvent::decode(body).unwrap().receiver.is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ChatEvent::decode("not json").is_err());
        assert!(ChatEvent::decode(r#"{"sender":"a","type":"SHOUT"}"#).is_err());
    }

    #[test]
    fn test_involves() {
        let event = ChatEvent::private(id("a"), id("b"), "x");
        assert!(event.involves(&id("a")));
        assert!(event.involves(&id("b")));
        assert!(!event.involves(&id("c")));
    }

    #[test]
    fn test_envelope_encode() {
        let envelope = Envelope::encode(channel::REGISTER, &PresenceNotice::join(id("a"))).unwrap();
        assert_eq!(envelope.destination, "/app/chat.register");
        assert!(envelope.body.contains("\"type\":\"JOIN\""));
    }
}
