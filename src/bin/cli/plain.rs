use chrono::Local;
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use stomp_ws::{ConnectOptions, ConnectionState, Event, Message, StompClient};
use tokio::sync::mpsc;

use super::args::Cli;
use super::commands::{CommandResult, execute_command, print_help};
use super::exit_codes;
use super::state::{SharedState, new_shared_state};

/// How long to wait for the broker's CONNECTED frame
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the interactive CLI
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    println!("Connecting to {}...", cli.url);

    let client = StompClient::websocket(build_options(cli));
    let state = new_shared_state(cli.url.clone());

    // listen before opening so the first events are not missed
    let mut startup = client.events();
    spawn_event_printer(&client, state.clone());

    if cli.reconnect {
        client.start_reconnect().await;
    }
    client.open().await;

    match tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connected(&client, &mut startup)).await {
        Ok(Ok(())) => println!("Connected."),
        Ok(Err(failure)) if !cli.reconnect => return Err(failure),
        Err(_) if !cli.reconnect => {
            return Err((
                format!("Connection timed out: {}", cli.url),
                exit_codes::NETWORK_ERROR,
            ));
        }
        _ => println!("Not connected yet, retrying in the background."),
    }
    drop(startup);

    // Channel for new subscription requests
    let (sub_tx, mut sub_rx) = mpsc::channel::<String>(16);

    for dest in &cli.subscribe {
        subscribe_destination(&client, dest, state.clone()).await;
    }

    let client_sub = client.clone();
    let state_sub = state.clone();
    tokio::spawn(async move {
        while let Some(dest) = sub_rx.recv().await {
            subscribe_destination(&client_sub, &dest, state_sub.clone()).await;
        }
    });

    // Channel to receive user commands from stdin reader
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);

    // Spawn blocking stdin reader
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.blocking_send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    println!();
    print_help();
    println!();

    loop {
        prompt();

        let line = tokio::select! {
            line = cmd_rx.recv() => match line {
                Some(l) => l,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        match execute_command(&line, &client, state.clone(), &sub_tx).await {
            CommandResult::Ok => {}
            CommandResult::Quit => break,
            CommandResult::Info(msg) => println!("{}", msg),
            CommandResult::Error(msg) => eprintln!("{}", msg),
        }
    }

    println!("Disconnecting...");
    client.stop_reconnect().await;
    client.disconnect().await;
    if cli.summary {
        println!("{}", state.lock().await.generate_summary());
    }

    Ok(())
}

/// Map command-line flags onto client options
pub fn build_options(cli: &Cli) -> ConnectOptions {
    let mut options = ConnectOptions::new(&cli.url).with_resubscribe(cli.reconnect);
    for (k, v) in &cli.headers {
        options = options.with_http_header(k, v);
    }
    for (k, v) in &cli.connect_headers {
        options = options.with_connect_header(k, v);
    }
    options
}

/// Wait until the broker accepts the connection or the attempt fails.
async fn wait_for_connected(
    client: &StompClient,
    events: &mut stomp_ws::EventStream,
) -> Result<(), (String, u8)> {
    while let Some(event) = events.next().await {
        match event {
            Event::Connected => return Ok(()),
            Event::ErrorReceived(err) => {
                // a transport failure leaves the client closed; a broker
                // ERROR arrives over an open transport
                let code = if client.state().await == ConnectionState::Closed {
                    exit_codes::NETWORK_ERROR
                } else {
                    exit_codes::PROTOCOL_ERROR
                };
                return Err((format!("Connection failed: {}", err), code));
            }
            Event::Disconnected => {
                return Err((
                    format!("Connection closed by {}", client.options().request.url),
                    exit_codes::NETWORK_ERROR,
                ));
            }
            _ => {}
        }
    }
    Err(("Client shut down".to_string(), exit_codes::NETWORK_ERROR))
}

/// Print lifecycle events as they happen
fn spawn_event_printer(client: &StompClient, state: SharedState) {
    let mut events = client.events();
    let client = client.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let now = Local::now().format("%H:%M:%S");
            match event {
                Event::Connected => {
                    let session = client.session_id().await;
                    println!("\n{} connected (session {})", now, session.as_deref().unwrap_or("-"));
                    state.lock().await.record_connected(session);
                }
                Event::Disconnected => {
                    println!("\n{} disconnected", now);
                    state.lock().await.record_disconnected();
                }
                Event::ReceiptReceived { receipt_id } => println!("\n{} receipt {}", now, receipt_id),
                Event::ErrorReceived(err) => {
                    eprintln!("\n{} [ERROR] {}", now, err);
                    state.lock().await.record_error();
                }
                Event::PingReceived => {
                    state.lock().await.record_ping();
                    continue;
                }
                // printed by the per-destination tasks
                Event::MessageReceived(_) => continue,
            }
            prompt();
        }
    });
}

/// Subscribe to a destination and spawn a message printer the first time
async fn subscribe_destination(client: &StompClient, dest: &str, state: SharedState) {
    let is_new = state.lock().await.register_subscription(dest);
    if !is_new {
        client.subscribe(dest, stomp_ws::AckMode::Auto).await;
        println!("Subscribed to: {}", dest);
        return;
    }

    let mut messages = client.subscribe_raw(dest).await;
    println!("Subscribed to: {}", dest);

    tokio::spawn(async move {
        while let Some(msg) = messages.next().await {
            handle_message(&msg, state.clone()).await;
        }
    });
}

/// Print and record an incoming message
async fn handle_message(msg: &Message, state: SharedState) {
    let body = msg.body.clone().unwrap_or_default();
    state.lock().await.record_message(&msg.destination, body.clone());

    println!(
        "\n{} [{}] MESSAGE received:",
        Local::now().format("%H:%M:%S"),
        msg.destination
    );
    for (k, v) in &msg.headers {
        println!("  {}: {}", k, v);
    }
    if !body.is_empty() {
        println!("  Body: {}", body);
    }
    prompt();
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
