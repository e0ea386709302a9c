//! Interactive chat loop
//!
//! Reads commands and messages from stdin while processing session
//! updates, in a single `select!` loop.

use chatline_core::events::{format_event, EventSink};
use chatline_core::{ChatClient, ChatEvent, Identity, MemoryBroker, MemoryTransport, Target};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  <text>        send to the active conversation
  /to <user>    switch to a private conversation
  /public       switch to the public room
  /users        list online users
  /history      show the active conversation
  /drop         simulate a lost connection
  /quit         log out and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Say(String),
    Switch(Target),
    Users,
    History,
    Drop,
    Help,
    Quit,
    Invalid(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Command::Say(line.to_string()));
        }

        let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
        let command = match name {
            "/quit" | "/exit" => Command::Quit,
            "/public" => Command::Switch(Target::Public),
            "/to" => match rest.parse::<Target>() {
                Ok(target) => Command::Switch(target),
                Err(e) => Command::Invalid(format!("/to: {e}")),
            },
            "/users" => Command::Users,
            "/history" => Command::History,
            "/drop" => Command::Drop,
            "/help" => Command::Help,
            other => Command::Invalid(format!("unknown command {other}, try /help")),
        };
        Some(command)
    }
}

#[derive(Serialize)]
struct UsersView<'a> {
    active: String,
    online: &'a [Identity],
    selectable: Vec<Identity>,
}

#[derive(Serialize)]
struct HistoryView<'a> {
    active: String,
    messages: Vec<&'a ChatEvent>,
}

/// Run the chat until `/quit` or stdin closes
pub async fn run_chat<E: EventSink>(
    mut client: ChatClient<MemoryTransport, E>,
    broker: &MemoryBroker,
    username: &Identity,
    json_output: bool,
) -> Result<(), String> {
    client.connect(username.as_str()).await.map_err(String::from)?;

    let mut active = Target::Public;
    let mut stdin_reader = BufReader::new(tokio::io::stdin()).lines();

    if !json_output {
        println!("{HELP}");
    }

    loop {
        tokio::select! {
            line = stdin_reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let Some(command) = Command::parse(&line) else {
                            continue;
                        };
                        match command {
                            Command::Quit => break,
                            Command::Say(text) => {
                                if let Err(e) = client.send(&text, &active).await {
                                    eprintln!("! {e}");
                                }
                            }
                            Command::Switch(target) => {
                                active = target;
                                println!("* Now talking to {active}");
                            }
                            Command::Users => {
                                let online = client.presence().snapshot();
                                let view = UsersView {
                                    active: active.to_string(),
                                    online: &online,
                                    selectable: client.selectable_users(),
                                };
                                if json_output {
                                    emit_view(client.sink(), "users", &view).await;
                                } else {
                                    print_users(&view);
                                }
                            }
                            Command::History => {
                                let view = HistoryView {
                                    active: active.to_string(),
                                    messages: client.visible(&active),
                                };
                                if json_output {
                                    emit_view(client.sink(), "history", &view).await;
                                } else {
                                    print_history(&view);
                                }
                            }
                            Command::Drop => {
                                let dropped = broker.drop_connection(username.as_str());
                                tracing::info!("Simulated loss of {} connection(s)", dropped);
                            }
                            Command::Help => println!("{HELP}"),
                            Command::Invalid(message) => eprintln!("! {message}"),
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Stdin closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }

            // Only the receive is raced; processing runs to completion.
            signal = client.recv_signal() => {
                match signal {
                    Some(signal) => {
                        client.process_signal(signal).await;
                    }
                    None => break,
                }
            }
        }
    }

    client.logout().await;
    Ok(())
}

async fn emit_view<E: EventSink, T: Serialize + Send + Sync>(sink: &E, name: &str, view: &T) {
    if let Err(e) = sink.emit_custom(name, view).await {
        tracing::warn!("Failed to emit {} view: {}", name, e);
    }
}

fn print_users(view: &UsersView<'_>) {
    println!("* Online ({}):", view.online.len());
    for user in view.online {
        let marker = if view.selectable.contains(user) { " " } else { "*" };
        println!("  {marker} {user}");
    }
}

fn print_history(view: &HistoryView<'_>) {
    println!("* {} ({} messages)", view.active, view.messages.len());
    for event in &view.messages {
        println!("  {}", format_event(event));
    }
}
