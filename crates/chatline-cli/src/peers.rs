//! Simulated users
//!
//! Each peer is a full [`ChatClient`] on the shared broker that answers
//! private messages with an echo.

use chatline_core::{
    ChatClient, ChatUpdate, ClientConfig, MemoryBroker, NoOpEventSink, Target,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub fn spawn_peers(
    broker: &MemoryBroker,
    names: &[String],
    config: &ClientConfig,
) -> Vec<JoinHandle<()>> {
    names
        .iter()
        .map(|name| spawn_peer(broker, name.clone(), config.clone()))
        .collect()
}

fn spawn_peer(broker: &MemoryBroker, name: String, config: ClientConfig) -> JoinHandle<()> {
    let mut client = ChatClient::new(broker.transport(), NoOpEventSink, config);

    tokio::spawn(async move {
        if let Err(e) = client.connect(&name).await {
            warn!("Peer '{}' could not join: {}", name, e);
            return;
        }

        while let Some(update) = client.next_update().await {
            let ChatUpdate::Private(event) = update else {
                continue;
            };
            let reply = format!("echo: {}", event.content);
            let target = Target::User(event.sender.clone());
            if let Err(e) = client.send(&reply, &target).await {
                debug!("Peer '{}' failed to reply to {}: {}", name, event.sender, e);
            }
        }
    })
}
