use std::io::Write;
use stomp_ws::StompClient;
use tokio::sync::mpsc;

use super::state::SharedState;

/// Result of executing a command
pub enum CommandResult {
    /// Command executed successfully
    Ok,
    /// Command requests exit
    Quit,
    /// Informational output
    Info(String),
    /// Error executing command
    Error(String),
}

/// Parse and execute a command
pub async fn execute_command(
    line: &str,
    client: &StompClient,
    state: SharedState,
    sub_tx: &mpsc::Sender<String>,
) -> CommandResult {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    if parts.is_empty() || parts[0].is_empty() {
        return CommandResult::Ok;
    }

    match parts[0] {
        "quit" | "exit" | "q" => CommandResult::Quit,

        "send" => {
            if parts.len() < 3 {
                return CommandResult::Error("Usage: send <destination> <message>".to_string());
            }
            client.send(parts[1], parts[2]).await;
            CommandResult::Ok
        }

        "json" => {
            if parts.len() < 3 {
                return CommandResult::Error("Usage: json <destination> <json>".to_string());
            }
            let value: serde_json::Value = match serde_json::from_str(parts[2]) {
                Ok(v) => v,
                Err(e) => return CommandResult::Error(format!("Invalid JSON: {}", e)),
            };
            match client.send_json(parts[1], &value).await {
                Ok(()) => CommandResult::Ok,
                Err(e) => CommandResult::Error(format!("Send error: {}", e)),
            }
        }

        "sub" | "subscribe" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: sub <destination>".to_string());
            }
            if sub_tx.send(parts[1].to_string()).await.is_err() {
                return CommandResult::Error("Failed to request subscription".to_string());
            }
            CommandResult::Ok
        }

        "unsub" | "unsubscribe" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: unsub <destination>".to_string());
            }
            client.unsubscribe(parts[1]).await;
            state.lock().await.unregister_subscription(parts[1]);
            CommandResult::Info(format!("Unsubscribed from: {}", parts[1]))
        }

        "begin" | "commit" | "abort" => {
            if parts.len() < 2 {
                return CommandResult::Error(format!("Usage: {} <transaction-id>", parts[0]));
            }
            let tx = parts[1];
            match parts[0] {
                "begin" => client.begin(tx).await,
                "commit" => client.commit(tx).await,
                _ => client.abort(tx).await,
            }
            CommandResult::Ok
        }

        "ack" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: ack <message-id> [subscription]".to_string());
            }
            client.ack(parts[1], parts.get(2).map(|s| s.trim())).await;
            CommandResult::Ok
        }

        "status" => {
            let connected = client.is_connected().await;
            let phase = client.state().await;
            let state = state.lock().await;
            CommandResult::Info(state.status_line(connected, phase))
        }

        "summary" | "report" => {
            let state = state.lock().await;
            let text = if parts[0] == "report" {
                state.generate_summary_with_options(true, 80)
            } else {
                state.generate_summary()
            };
            match parts.get(1) {
                Some(filename) => {
                    let written = std::fs::File::create(filename)
                        .and_then(|mut file| writeln!(file, "{}", text));
                    match written {
                        Ok(()) => CommandResult::Info(format!("{} written to {}", parts[0], filename)),
                        Err(e) => CommandResult::Error(format!("Failed to write {}: {}", filename, e)),
                    }
                }
                None => CommandResult::Info(text),
            }
        }

        "clear" => {
            state.lock().await.clear_messages();
            CommandResult::Ok
        }

        "help" | "?" => {
            print_help();
            CommandResult::Ok
        }

        _ => CommandResult::Error(format!("Unknown command: {}. Type 'help' for commands.", parts[0])),
    }
}

/// Print help text
pub fn print_help() {
    println!("Commands:");
    println!("  send <destination> <message>     - Send a text message");
    println!("  json <destination> <json>        - Send a JSON message");
    println!("  sub <destination>                - Subscribe to a destination");
    println!("  unsub <destination>              - Unsubscribe from a destination");
    println!("  begin|commit|abort <tx>          - Transaction control");
    println!("  ack <message-id> [subscription]  - Acknowledge a message");
    println!("  status                           - Show connection status");
    println!("  summary [file]                   - Print session summary (or save to file)");
    println!("  report [file]                    - Summary with message history (or save to file)");
    println!("  clear                            - Clear message history");
    println!("  quit                             - Disconnect and exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::state::new_shared_state;
    use futures::StreamExt;
    use stomp_ws::transport::memory::{MemoryConnector, OpenBehavior};
    use stomp_ws::{ConnectOptions, Event};

    fn setup() -> (StompClient, SharedState, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (connector, _broker) = MemoryConnector::with_behavior(OpenBehavior::Immediate);
        let client = StompClient::new(ConnectOptions::new("ws://test"), connector);
        let (tx, rx) = mpsc::channel(4);
        (client, new_shared_state("ws://test".into()), tx, rx)
    }

    #[tokio::test]
    async fn quit_and_blank_lines() {
        let (client, state, tx, _rx) = setup();
        assert!(matches!(execute_command("", &client, state.clone(), &tx).await, CommandResult::Ok));
        assert!(matches!(execute_command("quit", &client, state, &tx).await, CommandResult::Quit));
    }

    #[tokio::test]
    async fn sub_is_forwarded_to_subscription_task() {
        let (client, state, tx, mut rx) = setup();
        let r = execute_command("sub /topic/a", &client, state, &tx).await;
        assert!(matches!(r, CommandResult::Ok));
        assert_eq!(rx.recv().await.as_deref(), Some("/topic/a"));
    }

    #[tokio::test]
    async fn usage_errors() {
        let (client, state, tx, _rx) = setup();
        for line in ["send /a", "json /a", "sub", "unsub", "begin", "ack", "bogus"] {
            assert!(
                matches!(execute_command(line, &client, state.clone(), &tx).await, CommandResult::Error(_)),
                "{line}"
            );
        }
        assert!(matches!(
            execute_command("json /a {not json", &client, state, &tx).await,
            CommandResult::Error(_)
        ));
    }

    #[tokio::test]
    async fn send_without_connection_reports_disconnect() {
        let (client, state, tx, _rx) = setup();
        let mut events = client.events();
        execute_command("send /a hello world", &client, state, &tx).await;
        assert_eq!(events.next().await, Some(Event::Disconnected));
    }

    #[tokio::test]
    async fn status_mentions_url() {
        let (client, state, tx, _rx) = setup();
        match execute_command("status", &client, state, &tx).await {
            CommandResult::Info(text) => assert!(text.starts_with("ws://test state=Idle")),
            _ => panic!("expected status info"),
        }
    }
}
