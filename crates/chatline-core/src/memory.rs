//! In-process broker
//!
//! A [`MemoryBroker`] speaks the chat server's destination semantics
//! without any network: registration and leave maintain the online set and
//! broadcast presence, public sends fan out to every subscriber, private
//! sends reach only the receiver's connections. [`MemoryTransport`] plugs a
//! client into it through the [`Transport`] seam.
//!
//! It doubles as the test harness: connections can be refused or dropped,
//! and everything published is kept for inspection.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::identity::Identity;
use crate::protocol::{channel, ChatEvent, MessageKind};
use crate::transport::{
    Transport, TransportConfig, TransportError, TransportEvent, TransportNotifier,
};

/// One payload received by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub connection: u64,
    pub destination: String,
    pub body: String,
}

impl Published {
    /// Decode the body as a chat event
    pub fn event(&self) -> Option<ChatEvent> {
        ChatEvent::decode(&self.body).ok()
    }
}

struct Connection {
    username: Option<Identity>,
    subscriptions: Vec<String>,
    notifier: TransportNotifier,
}

impl Connection {
    fn is_subscribed(&self, channel_name: &str) -> bool {
        self.subscriptions.iter().any(|s| s == channel_name)
    }
}

#[derive(Default)]
struct BrokerState {
    next_connection: u64,
    connections: BTreeMap<u64, Connection>,
    online: Vec<Identity>,
    published: Vec<Published>,
    refusing: bool,
}

impl BrokerState {
    fn deliver<F>(&self, channel_name: &str, body: &str, accept: F) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        let mut delivered = 0;
        for conn in self.connections.values() {
            if conn.is_subscribed(channel_name) && accept(conn) {
                conn.notifier.notify(TransportEvent::Message {
                    channel: channel_name.to_string(),
                    body: body.to_string(),
                });
                delivered += 1;
            }
        }
        delivered
    }

    fn broadcast_presence(&self) {
        match serde_json::to_string(&self.online) {
            Ok(body) => {
                self.deliver(channel::TOPIC_USERS, &body, |_| true);
            }
            Err(e) => warn!("Failed to encode presence: {}", e),
        }
    }

    fn broadcast_event(&self, event: &ChatEvent) {
        match serde_json::to_string(event) {
            Ok(body) => {
                self.deliver(channel::TOPIC_PUBLIC, &body, |_| true);
            }
            Err(e) => warn!("Failed to encode event: {}", e),
        }
    }
}

/// Shared in-process broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh client-side transport attached to this broker
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            connection: Arc::new(Mutex::new(None)),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make subsequent connect attempts fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refusing = refuse;
    }

    /// Simulate transport loss for every connection registered as `name`.
    ///
    /// The user stays in the online set; only an explicit leave removes it.
    pub fn drop_connection(&self, name: &str) -> usize {
        let mut state = self.state();
        let ids: Vec<u64> = state
            .connections
            .iter()
            .filter(|(_, conn)| conn.username.as_ref().map(|u| u == name).unwrap_or(false))
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(conn) = state.connections.remove(id) {
                debug!(connection = id, "Dropping connection");
                conn.notifier.notify(TransportEvent::Disconnected {
                    reason: Some("connection dropped by broker".to_string()),
                });
            }
        }
        ids.len()
    }

    /// Names currently registered, in registration order
    pub fn online(&self) -> Vec<Identity> {
        self.state().online.clone()
    }

    /// Everything published so far
    pub fn published(&self) -> Vec<Published> {
        self.state().published.clone()
    }

    /// Payloads published to `destination`
    pub fn published_to(&self, destination: &str) -> Vec<Published> {
        self.state()
            .published
            .iter()
            .filter(|p| p.destination == destination)
            .cloned()
            .collect()
    }

    /// Subscriptions held by the live connections registered as `name`
    pub fn subscriptions(&self, name: &str) -> Vec<String> {
        self.state()
            .connections
            .values()
            .filter(|conn| conn.username.as_ref().map(|u| u == name).unwrap_or(false))
            .flat_map(|conn| conn.subscriptions.iter().cloned())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }

    fn open(&self, notifier: TransportNotifier) -> Result<u64, TransportError> {
        let mut state = self.state();
        if state.refusing {
            return Err(TransportError::ConnectionRefused(
                "broker is refusing connections".to_string(),
            ));
        }

        state.next_connection += 1;
        let id = state.next_connection;
        notifier.notify(TransportEvent::Connected);
        state.connections.insert(
            id,
            Connection {
                username: None,
                subscriptions: Vec::new(),
                notifier,
            },
        );
        Ok(id)
    }

    fn close(&self, connection: u64) {
        self.state().connections.remove(&connection);
    }

    fn subscribe(&self, connection: u64, channel_name: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        let conn = state
            .connections
            .get_mut(&connection)
            .ok_or(TransportError::Closed)?;
        if !conn.is_subscribed(channel_name) {
            conn.subscriptions.push(channel_name.to_string());
        }
        Ok(())
    }

    fn publish(&self, connection: u64, destination: &str, body: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.connections.contains_key(&connection) {
            return Err(TransportError::Closed);
        }

        state.published.push(Published {
            connection,
            destination: destination.to_string(),
            body: body.to_string(),
        });

        let mut event =
            ChatEvent::decode(body).map_err(|e| TransportError::Protocol(format!("bad payload: {e}")))?;

        match destination {
            channel::REGISTER => {
                let name = event.sender.clone();
                if let Some(conn) = state.connections.get_mut(&connection) {
                    conn.username = Some(name.clone());
                }
                if !state.online.contains(&name) {
                    state.online.push(name.clone());
                }
                state.broadcast_presence();

                event.content = format!("{name} joined the chat!");
                event.kind = MessageKind::Join;
                state.broadcast_event(&event);
            }
            channel::LEAVE => {
                let name = event.sender.clone();
                state.online.retain(|u| u != &name);
                state.broadcast_presence();

                event.content = format!("{name} left the chat!");
                event.kind = MessageKind::Leave;
                state.broadcast_event(&event);
            }
            channel::SEND_PUBLIC => {
                state.deliver(channel::TOPIC_PUBLIC, body, |_| true);
            }
            channel::SEND_PRIVATE => {
                let Some(receiver) = event.receiver.clone() else {
                    return Err(TransportError::Protocol("private message without receiver".to_string()));
                };
                let delivered = state.deliver(channel::QUEUE_PRIVATE, body, |conn| {
                    conn.username.as_ref() == Some(&receiver)
                });
                debug!(receiver = %receiver, delivered, "Routed private message");
            }
            other => {
                debug!(destination = other, "No handler for destination");
            }
        }
        Ok(())
    }
}

/// Client side of a [`MemoryBroker`] connection
#[derive(Clone)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    connection: Arc<Mutex<Option<u64>>>,
}

impl MemoryTransport {
    fn current(&self) -> Result<u64, TransportError> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .ok_or(TransportError::NotConnected)
    }

    fn replace(&self, next: Option<u64>) -> Option<u64> {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(
        &self,
        config: &TransportConfig,
        notifier: TransportNotifier,
    ) -> Result<(), TransportError> {
        if !config.is_memory() {
            return Err(TransportError::InvalidConfig(format!(
                "memory transport cannot reach {}",
                config.url
            )));
        }

        if let Some(previous) = self.replace(None) {
            self.broker.close(previous);
        }

        let id = self.broker.open(notifier)?;
        debug!(
            connection = id,
            heartbeat_in = ?config.heartbeat_incoming,
            heartbeat_out = ?config.heartbeat_outgoing,
            "Opened in-process connection"
        );
        self.replace(Some(id));
        Ok(())
    }

    async fn subscribe(&self, channel_name: &str) -> Result<(), TransportError> {
        let id = self.current()?;
        self.broker.subscribe(id, channel_name)
    }

    async fn publish(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        let id = self.current()?;
        self.broker.publish(id, destination, body)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(id) = self.replace(None) {
            self.broker.close(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Signal;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn memory_config() -> TransportConfig {
        TransportConfig {
            url: "memory://test".to_string(),
            heartbeat_incoming: Duration::ZERO,
            heartbeat_outgoing: Duration::ZERO,
        }
    }

    fn messages(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            if let Signal::Transport {
                event:
                    TransportEvent::Message {
                        channel: channel_name,
                        body,
                    },
                ..
            } = signal
            {
                out.push((channel_name, body));
            }
        }
        out
    }

    async fn attach(
        broker: &MemoryBroker,
        name: &str,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<Signal>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = broker.transport();
        transport
            .connect(&memory_config(), TransportNotifier::new(1, tx))
            .await
            .unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(Signal::Transport {
                event: TransportEvent::Connected,
                ..
            })
        ));
        for ch in channel::SUBSCRIPTIONS {
            transport.subscribe(ch).await.unwrap();
        }
        let join = format!(r#"{{"sender":"{name}","type":"JOIN"}}"#);
        transport.publish(channel::REGISTER, &join).await.unwrap();
        (transport, rx)
    }

    #[tokio::test]
    async fn test_register_broadcasts_presence_then_join() {
        let broker = MemoryBroker::new();
        let (_alice, mut rx) = attach(&broker, "alice").await;

        let received = messages(&mut rx);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0, channel::TOPIC_USERS);
        assert_eq!(received[0].1, r#"["alice"]"#);
        assert_eq!(received[1].0, channel::TOPIC_PUBLIC);

        let join = ChatEvent::decode(&received[1].1).unwrap();
        assert_eq!(join.kind, MessageKind::Join);
        assert_eq!(join.content, "alice joined the chat!");
    }

    #[tokio::test]
    async fn test_private_reaches_receiver_only() {
        let broker = MemoryBroker::new();
        let (alice, mut alice_rx) = attach(&broker, "alice").await;
        let (_bob, mut bob_rx) = attach(&broker, "bob").await;
        let (_carol, mut carol_rx) = attach(&broker, "carol").await;
        messages(&mut alice_rx);
        messages(&mut bob_rx);
        messages(&mut carol_rx);

        let body = r#"{"sender":"alice","content":"hi","type":"PRIVATE","receiver":"bob"}"#;
        alice.publish(channel::SEND_PRIVATE, body).await.unwrap();

        assert!(messages(&mut alice_rx).is_empty());
        assert!(messages(&mut carol_rx).is_empty());
        let bob_msgs = messages(&mut bob_rx);
        assert_eq!(bob_msgs, vec![(channel::QUEUE_PRIVATE.to_string(), body.to_string())]);
    }

    #[tokio::test]
    async fn test_leave_updates_online() {
        let broker = MemoryBroker::new();
        let (alice, _rx) = attach(&broker, "alice").await;
        let (_bob, mut bob_rx) = attach(&broker, "bob").await;
        messages(&mut bob_rx);

        alice
            .publish(channel::LEAVE, r#"{"sender":"alice","type":"LEAVE"}"#)
            .await
            .unwrap();

        assert_eq!(broker.online(), vec![Identity::parse("bob").unwrap()]);
        let received = messages(&mut bob_rx);
        assert_eq!(received[0].1, r#"["bob"]"#);
        let leave = ChatEvent::decode(&received[1].1).unwrap();
        assert_eq!(leave.content, "alice left the chat!");
    }

    #[tokio::test]
    async fn test_refuse_and_drop() {
        let broker = MemoryBroker::new();
        broker.refuse_connections(true);

        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = broker.transport();
        let err = transport
            .connect(&memory_config(), TransportNotifier::new(1, tx))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionRefused(_)));

        broker.refuse_connections(false);
        let (alice, mut rx) = attach(&broker, "alice").await;
        messages(&mut rx);

        assert_eq!(broker.drop_connection("alice"), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(Signal::Transport {
                event: TransportEvent::Disconnected { .. },
                ..
            })
        ));
        assert!(matches!(
            alice.publish(channel::SEND_PUBLIC, "{}").await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            alice.subscribe(channel::TOPIC_PUBLIC).await,
            Err(TransportError::Closed)
        ));
        // Dropped, not departed
        assert_eq!(broker.online().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_foreign_scheme() {
        let broker = MemoryBroker::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = TransportConfig {
            url: "ws://localhost:8080/ws".to_string(),
            ..memory_config()
        };
        let err = broker
            .transport()
            .connect(&config, TransportNotifier::new(1, tx))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_subscriptions_are_idempotent() {
        let broker = MemoryBroker::new();
        let (alice, _rx) = attach(&broker, "alice").await;
        alice.subscribe(channel::TOPIC_PUBLIC).await.unwrap();
        assert_eq!(broker.subscriptions("alice").len(), 3);
    }
}
