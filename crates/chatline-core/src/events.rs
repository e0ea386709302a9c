//! Event Sink Trait
//!
//! This module provides the EventSink trait for decoupling session
//! notifications from whatever displays them. Implementations can print
//! to stdout (CLI), feed a UI, or record for tests.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::identity::Identity;
use crate::protocol::{ChatEvent, MessageKind};
use crate::session::ConnectionState;

/// Event sink for emitting session events to listeners
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit a connection state transition
    async fn emit_state(
        &self,
        state: ConnectionState,
        identity: Option<&Identity>,
    ) -> Result<(), String>;

    /// Emit a chat event appended to public or private history
    async fn emit_message(&self, event: &ChatEvent) -> Result<(), String>;

    /// Emit a new presence snapshot
    async fn emit_presence(&self, users: &[Identity]) -> Result<(), String>;

    /// Emit a non-fatal problem (dropped payload, transport hiccup)
    async fn emit_error(&self, message: &str) -> Result<(), String>;

    /// Emit a generic event with custom payload
    async fn emit_custom<T: Serialize + Send + Sync>(
        &self,
        event_name: &str,
        payload: &T,
    ) -> Result<(), String>;
}

/// No-op event sink for testing or headless clients
#[derive(Default, Clone)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit_state(
        &self,
        _state: ConnectionState,
        _identity: Option<&Identity>,
    ) -> Result<(), String> {
        Ok(())
    }

    async fn emit_message(&self, _event: &ChatEvent) -> Result<(), String> {
        Ok(())
    }

    async fn emit_presence(&self, _users: &[Identity]) -> Result<(), String> {
        Ok(())
    }

    async fn emit_error(&self, _message: &str) -> Result<(), String> {
        Ok(())
    }

    async fn emit_custom<T: Serialize + Send + Sync>(
        &self,
        _event_name: &str,
        _payload: &T,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Stdout event sink for CLI mode - prints events to console
#[derive(Default, Clone)]
pub struct StdoutEventSink {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StdoutEventSink {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    fn print_json<T: Serialize>(&self, event_name: &str, payload: &T) -> Result<(), String> {
        let payload = serde_json::to_value(payload).map_err(|e| e.to_string())?;
        let line = serde_json::json!({ "event": event_name, "payload": payload });
        println!("{line}");
        Ok(())
    }
}

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit_state(
        &self,
        state: ConnectionState,
        identity: Option<&Identity>,
    ) -> Result<(), String> {
        if self.json_output {
            let payload = serde_json::json!({
                "state": state.to_string(),
                "identity": identity.map(Identity::as_str),
            });
            return self.print_json("state", &payload);
        }
        match (state, identity) {
            (ConnectionState::Connected, Some(id)) => println!("* Online as {id}"),
            (ConnectionState::Connecting, _) => println!("* Connecting..."),
            (ConnectionState::Disconnected, _) => println!("* Offline"),
            (state, None) => println!("* {state}"),
        }
        Ok(())
    }

    async fn emit_message(&self, event: &ChatEvent) -> Result<(), String> {
        if self.json_output {
            return self.print_json("message", event);
        }
        println!("{}", format_event(event));
        Ok(())
    }

    async fn emit_presence(&self, users: &[Identity]) -> Result<(), String> {
        if self.json_output {
            return self.print_json("presence", &users);
        }
        let names: Vec<&str> = users.iter().map(Identity::as_str).collect();
        println!("* Online users ({}): {}", users.len(), names.join(", "));
        Ok(())
    }

    async fn emit_error(&self, message: &str) -> Result<(), String> {
        if self.json_output {
            return self.print_json("error", &message);
        }
        eprintln!("! {message}");
        Ok(())
    }

    async fn emit_custom<T: Serialize + Send + Sync>(
        &self,
        event_name: &str,
        payload: &T,
    ) -> Result<(), String> {
        if self.json_output {
            return self.print_json(event_name, payload);
        }
        let payload_json = serde_json::to_string(payload).unwrap_or_default();
        println!("[{event_name}] {payload_json}");
        Ok(())
    }
}

/// One-line rendering of a chat event
pub fn format_event(event: &ChatEvent) -> String {
    let time = format_timestamp(event.timestamp);
    match (event.kind, event.receiver.as_ref()) {
        (MessageKind::Join | MessageKind::Leave, _) if !event.content.is_empty() => {
            format!("[{time}] * {}", event.content)
        }
        (MessageKind::Join, _) => format!("[{time}] * {} joined", event.sender),
        (MessageKind::Leave, _) => format!("[{time}] * {} left", event.sender),
        (MessageKind::Private, Some(receiver)) => {
            format!("[{time}] {} -> {}: {}", event.sender, receiver, event.content)
        }
        _ => format!("[{time}] {}: {}", event.sender, event.content),
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        assert!(sink
            .emit_state(ConnectionState::Connected, Some(&id("a")))
            .await
            .is_ok());
        assert!(sink.emit_presence(&[id("a")]).await.is_ok());
        assert!(sink.emit_custom("x", &1u32).await.is_ok());
    }

    #[test]
    fn test_format_event() {
        let chat = ChatEvent::chat(id("alice"), "hello");
        assert!(format_event(&chat).ends_with("alice: hello"));

        let private = ChatEvent::private(id("alice"), id("bob"), "psst");
        assert!(format_event(&private).ends_with("alice -> bob: psst"));

        let mut join = ChatEvent::chat(id("carol"), "carol joined the chat!");
        join.kind = MessageKind::Join;
        assert!(format_event(&join).ends_with("* carol joined the chat!"));

        join.content.clear();
        assert!(format_event(&join).ends_with("* carol joined"));
    }
}
