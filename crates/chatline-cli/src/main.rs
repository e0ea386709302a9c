//! Chatline CLI
//!
//! Interactive terminal chat. Joins a broker under a username, shows the
//! public room and private conversations, and keeps the session alive
//! across connection drops.

use chatline_core::config::defaults;
use chatline_core::events::StdoutEventSink;
use chatline_core::transport::TransportType;
use chatline_core::{generate_username, ChatClient, ClientConfig, Identity, MemoryBroker};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod peers;
mod repl;

/// Chatline - presence-aware chat over a pub/sub broker
///
/// Type to talk in the public room, `/to <user>` to switch to a private
/// conversation, `/help` for the rest.
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(version, about, long_about = None)]
struct Args {
    /// Username to join as (a random one is generated if omitted)
    #[arg(short, long, env = "CHATLINE_USERNAME")]
    username: Option<String>,

    /// Broker URL
    #[arg(long, env = "CHATLINE_URL", default_value = defaults::DEFAULT_BROKER_URL)]
    url: String,

    /// Delay before each reconnect attempt, in milliseconds
    #[arg(long, default_value_t = defaults::DEFAULT_RECONNECT_DELAY_MS)]
    reconnect_delay_ms: u64,

    /// Heartbeat interval in both directions, in milliseconds
    #[arg(long, default_value_t = defaults::DEFAULT_HEARTBEAT_OUTGOING_MS)]
    heartbeat_ms: u64,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Simulated user to start on the same broker (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Do not keep a local copy of sent private messages
    #[arg(long)]
    no_echo_private: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = ClientConfig::new()
        .with_broker_url(args.url.clone())
        .with_reconnect_delay(Duration::from_millis(args.reconnect_delay_ms))
        .with_heartbeat(Duration::from_millis(args.heartbeat_ms))
        .with_echo_private(!args.no_echo_private);

    match config.transport_config().transport_type() {
        Ok(TransportType::Memory) => {}
        Ok(other) => {
            eprintln!("Error: no {other} transport is built in; use a memory:// URL");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    }

    let username = match args.username.as_deref().map(Identity::parse) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
        None => generate_username(),
    };

    let broker = MemoryBroker::new();
    let peer_handles = peers::spawn_peers(&broker, &args.peers, &config);

    let json_output = matches!(args.format, OutputFormat::Json);
    let client = ChatClient::new(broker.transport(), StdoutEventSink::new(json_output), config);

    tracing::info!("Joining {} as '{}'", args.url, username);

    let result = repl::run_chat(client, &broker, &username, json_output).await;

    for handle in peer_handles {
        handle.abort();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
