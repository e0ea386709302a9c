//! Session manager
//!
//! [`ChatClient`] owns one chat session: identity, connection state,
//! message logs, presence and reconnect timer. Everything that happens to
//! the session arrives as a [`Signal`] on one queue and is processed in
//! order by [`ChatClient::next_update`], so there is no internal
//! parallelism to reason about.
//!
//! Every connect attempt and every logout bumps a generation counter.
//! Transport notifications and reconnect timers carry the generation they
//! were issued under and are dropped if it is no longer current, which is
//! what keeps a late reconnect from reviving a logged-out identity.

use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{PublishError, Result, ValidationError};
use crate::events::EventSink;
use crate::identity::Identity;
use crate::presence::PresenceTracker;
use crate::protocol::{channel, ChatEvent, MessageKind};
use crate::reconnect::ReconnectPolicy;
use crate::router::{Inbound, MessageRouter, Target};
use crate::session::{ConnectionState, Session};
use crate::transport::{Signal, Transport, TransportEvent, TransportNotifier};

/// Outcome of processing one signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    StateChanged(ConnectionState),
    Public(ChatEvent),
    Private(ChatEvent),
    Presence(Vec<Identity>),
    /// A reconnect attempt was started
    Reconnecting { attempt: u32 },
    /// Stale, duplicate, or undeliverable signal
    Ignored,
}

pub struct ChatClient<T: Transport, E: EventSink> {
    transport: T,
    sink: E,
    config: ClientConfig,
    session: Session,
    presence: PresenceTracker,
    reconnect: ReconnectPolicy,
    subscriptions: BTreeSet<&'static str>,
    generation: u64,
    tx: mpsc::UnboundedSender<Signal>,
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl<T: Transport, E: EventSink> ChatClient<T, E> {
    pub fn new(transport: T, sink: E, config: ClientConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let reconnect = ReconnectPolicy::new(config.reconnect_delay());
        Self {
            transport,
            sink,
            config,
            session: Session::new(),
            presence: PresenceTracker::new(),
            reconnect,
            subscriptions: BTreeSet::new(),
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity.as_ref()
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Online users other than ourselves
    pub fn selectable_users(&self) -> Vec<Identity> {
        self.presence.selectable(self.session.identity.as_ref())
    }

    pub fn visible(&self, target: &Target) -> Vec<&ChatEvent> {
        self.session.visible(target)
    }

    /// Channels subscribed on the current connection
    pub fn active_subscriptions(&self) -> Vec<&'static str> {
        self.subscriptions.iter().copied().collect()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    /// Log in as `username`.
    ///
    /// Any existing session is logged out first. The call returns once the
    /// transport has been asked to connect; `Connected` arrives later via
    /// [`next_update`](Self::next_update). A refused connection is not an
    /// error here, it schedules a retry.
    pub async fn connect(&mut self, username: &str) -> Result<()> {
        let identity = Identity::parse(username)?;

        if let Some(previous) = self.session.identity.clone() {
            info!(previous = %previous, next = %identity, "Superseding existing session");
            self.disconnect().await;
        }

        self.session = Session::begin(identity);
        info!(
            session_id = %self.session.id,
            identity = %username.trim(),
            url = %self.config.broker_url,
            "Connecting"
        );
        self.emit_state().await;
        self.open_transport().await;
        Ok(())
    }

    /// Log out: best-effort LEAVE, transport teardown, session reset.
    ///
    /// Cancels any pending reconnect. Never fails; problems sending LEAVE
    /// or closing the transport are logged.
    pub async fn disconnect(&mut self) {
        let Some(identity) = self.session.identity.clone() else {
            return;
        };

        self.reconnect.cancel();
        self.generation += 1;

        if self.session.is_connected() {
            match MessageRouter::leave(&identity) {
                Ok(envelope) => {
                    debug!(destination = envelope.destination, body = %envelope.body, ">>> SEND");
                    if let Err(e) = self
                        .transport
                        .publish(envelope.destination, &envelope.body)
                        .await
                    {
                        warn!(identity = %identity, "Failed to send leave message: {}", e);
                    }
                }
                Err(e) => warn!(identity = %identity, "Failed to build leave message: {}", e),
            }
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Failed to close transport: {}", e);
        }

        info!(session_id = %self.session.id, identity = %identity, "Logged out");

        self.subscriptions.clear();
        self.presence.clear();
        self.session.reset();
        self.reconnect.reset();
        self.emit_state().await;
    }

    /// Alias for [`disconnect`](Self::disconnect)
    pub async fn logout(&mut self) {
        self.disconnect().await;
    }

    /// Send `content` to `target`.
    ///
    /// Blank content and sends while not connected are rejected without
    /// touching the transport.
    pub async fn send(&mut self, content: &str, target: &Target) -> Result<ChatEvent> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let sender = match &self.session.identity {
            Some(id) if self.session.is_connected() => id.clone(),
            _ => return Err(PublishError::NotConnected.into()),
        };

        let (event, envelope) = MessageRouter::outbound(&sender, content, target)?;

        debug!(destination = envelope.destination, body = %envelope.body, ">>> SEND");
        self.transport
            .publish(envelope.destination, &envelope.body)
            .await
            .map_err(PublishError::from)?;

        // A note to self comes back from the broker; no local copy needed.
        let to_self = event.receiver.as_ref() == Some(&sender);
        if event.kind == MessageKind::Private && self.config.echo_private && !to_self {
            self.session.private_history.push(event.clone());
            let _ = self.sink.emit_message(&event).await;
        }

        Ok(event)
    }

    /// Wait for the next signal and process it.
    ///
    /// Not cancel-safe: dropping the future part way through processing
    /// can leave a connect half applied. Inside `tokio::select!` use
    /// [`recv_signal`](Self::recv_signal) as the branch and pass the result
    /// to [`process_signal`](Self::process_signal) in the handler.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let signal = self.recv_signal().await?;
        Some(self.process_signal(signal).await)
    }

    /// Wait for the next queued signal without processing it.
    ///
    /// Cancel-safe: a signal is only taken off the queue when this resolves.
    pub async fn recv_signal(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Apply one signal obtained from [`recv_signal`](Self::recv_signal)
    pub async fn process_signal(&mut self, signal: Signal) -> ChatUpdate {
        self.handle_signal(signal).await
    }

    /// Process every signal already queued, without waiting
    pub async fn drain(&mut self) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Ok(signal) = self.rx.try_recv() {
            updates.push(self.handle_signal(signal).await);
        }
        updates
    }

    async fn handle_signal(&mut self, signal: Signal) -> ChatUpdate {
        if signal.generation() != self.generation {
            debug!(
                signal_generation = signal.generation(),
                current = self.generation,
                "Dropping stale signal"
            );
            return ChatUpdate::Ignored;
        }

        match signal {
            Signal::ReconnectDue { .. } => self.on_reconnect_due().await,
            Signal::Transport { event, .. } => match event {
                TransportEvent::Connected => self.on_connected().await,
                TransportEvent::Disconnected { reason } => {
                    let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                    self.on_transport_lost(&reason).await
                }
                TransportEvent::Error(message) => self.on_transport_lost(&message).await,
                TransportEvent::Message {
                    channel: channel_name,
                    body,
                } => self.on_message(&channel_name, &body).await,
            },
        }
    }

    async fn open_transport(&mut self) {
        self.generation += 1;
        let notifier = TransportNotifier::new(self.generation, self.tx.clone());
        let transport_config = self.config.transport_config();

        match self.transport.connect(&transport_config, notifier).await {
            Ok(()) => debug!(generation = self.generation, "Transport connect requested"),
            Err(e) => {
                warn!(session_id = %self.session.id, "Connect failed: {}", e);
                let _ = self.sink.emit_error(&format!("Connect failed: {e}")).await;
                self.reconnect.schedule(self.generation, &self.tx);
            }
        }
    }

    async fn on_connected(&mut self) -> ChatUpdate {
        let Some(identity) = self.session.identity.clone() else {
            return ChatUpdate::Ignored;
        };
        if self.session.state == ConnectionState::Connected {
            return ChatUpdate::Ignored;
        }

        self.session.state = ConnectionState::Connected;
        self.reconnect.reset();

        // Subscriptions never survive a transport reconnect; arm them again.
        self.subscriptions.clear();
        for channel_name in channel::SUBSCRIPTIONS {
            match self.transport.subscribe(channel_name).await {
                Ok(()) => {
                    debug!(channel = channel_name, ">>> SUBSCRIBE");
                    self.subscriptions.insert(channel_name);
                }
                Err(e) => {
                    return self
                        .on_transport_lost(&format!("subscribe {channel_name} failed: {e}"))
                        .await;
                }
            }
        }

        match MessageRouter::register(&identity) {
            Ok(envelope) => {
                debug!(destination = envelope.destination, body = %envelope.body, ">>> SEND");
                if let Err(e) = self
                    .transport
                    .publish(envelope.destination, &envelope.body)
                    .await
                {
                    warn!(identity = %identity, "Failed to register: {}", e);
                }
            }
            Err(e) => warn!(identity = %identity, "Failed to build registration: {}", e),
        }

        info!(session_id = %self.session.id, identity = %identity, "Connected");
        self.emit_state().await;
        ChatUpdate::StateChanged(ConnectionState::Connected)
    }

    async fn on_transport_lost(&mut self, reason: &str) -> ChatUpdate {
        if self.session.identity.is_none() || self.session.state == ConnectionState::Disconnected {
            return ChatUpdate::Ignored;
        }

        warn!(session_id = %self.session.id, reason, "Transport lost");
        let previous = self.session.state;
        self.session.state = ConnectionState::Connecting;
        self.subscriptions.clear();
        self.reconnect.schedule(self.generation, &self.tx);
        let _ = self.sink.emit_error(&format!("Connection lost: {reason}")).await;

        if previous == ConnectionState::Connecting {
            return ChatUpdate::Ignored;
        }
        self.emit_state().await;
        ChatUpdate::StateChanged(ConnectionState::Connecting)
    }

    async fn on_reconnect_due(&mut self) -> ChatUpdate {
        if self.session.identity.is_none() || self.session.state != ConnectionState::Connecting {
            return ChatUpdate::Ignored;
        }

        let attempt = self.reconnect.begin_attempt();
        info!(session_id = %self.session.id, attempt, "Reconnecting");
        self.open_transport().await;
        ChatUpdate::Reconnecting { attempt }
    }

    async fn on_message(&mut self, channel_name: &str, body: &str) -> ChatUpdate {
        debug!(channel = channel_name, body, "<<< MESSAGE");
        if self.session.identity.is_none() {
            return ChatUpdate::Ignored;
        }

        match MessageRouter::classify(channel_name, body) {
            Ok(Inbound::Public(event)) => {
                self.session.public_history.push(event.clone());
                let _ = self.sink.emit_message(&event).await;
                ChatUpdate::Public(event)
            }
            Ok(Inbound::Private(event)) => {
                self.session.private_history.push(event.clone());
                let _ = self.sink.emit_message(&event).await;
                ChatUpdate::Private(event)
            }
            Ok(Inbound::Presence(users)) => {
                self.presence.replace(users);
                let snapshot = self.presence.snapshot();
                debug!(count = snapshot.len(), "Online users updated");
                let _ = self.sink.emit_presence(&snapshot).await;
                ChatUpdate::Presence(snapshot)
            }
            Ok(Inbound::Unrouted(other)) => {
                debug!(channel = %other, "Ignoring message on unknown channel");
                ChatUpdate::Ignored
            }
            Err(e) => {
                warn!("Dropping inbound payload: {}", e);
                let _ = self.sink.emit_error(&e.to_string()).await;
                ChatUpdate::Ignored
            }
        }
    }

    async fn emit_state(&self) {
        let _ = self
            .sink
            .emit_state(self.session.state, self.session.identity.as_ref())
            .await;
    }
}
