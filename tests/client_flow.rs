//! Connection lifecycle driven through the in-memory transport.

mod common;

use common::{CONNECTED, connected_client, handshake, message, next_frame};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use stomp_ws::transport::memory::{MemoryConnector, OpenBehavior};
use stomp_ws::{Command, ConnectOptions, ConnectionState, Event, Headers, StompClient};

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn connect_sends_caller_headers_and_forced_version() {
    let (connector, mut broker) = MemoryConnector::new();
    let client = StompClient::new(
        ConnectOptions::new("ws://broker/ws")
            .with_http_header("Authorization", "Bearer abc")
            .with_connect_header("login", "guest")
            .with_connect_header("accept-version", "1.0"),
        connector,
    );

    client.open().await;
    assert!(client.is_connected().await, "flag is optimistic");
    assert_eq!(client.state().await, ConnectionState::Connecting);

    let mut peer = broker.accept().await.expect("transport");
    assert_eq!(peer.request().url, "ws://broker/ws");
    assert_eq!(
        peer.request().headers,
        vec![("Authorization".to_string(), "Bearer abc".to_string())]
    );

    peer.open();
    let connect = next_frame(&mut peer).await;
    assert_eq!(connect.command, Command::Connect);
    assert_eq!(connect.get_header("accept-version"), Some("1.1,1.2"));
    assert_eq!(connect.get_header("login"), Some("guest"));
}

#[tokio::test]
async fn connected_frame_records_session() {
    let (client, _broker, _peer) = connected_client(ConnectOptions::default()).await;
    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(client.session_id().await.as_deref(), Some("sess-1"));
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn open_while_connecting_reuses_transport() {
    let (connector, broker) = MemoryConnector::new();
    let client = StompClient::new(ConnectOptions::default(), connector);
    client.open().await;
    client.open().await;
    assert_eq!(broker.attempts(), 1);
}

#[tokio::test]
async fn transport_failure_reports_error_without_disconnect() {
    let (connector, broker) = MemoryConnector::with_behavior(OpenBehavior::Fail("refused".into()));
    let client = StompClient::new(ConnectOptions::default(), connector);
    let mut events = client.events();

    client.open().await;
    match events.next().await {
        Some(Event::ErrorReceived(err)) => assert_eq!(err.description, "refused"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(!client.is_connected().await);
    assert_eq!(client.state().await, ConnectionState::Closed);

    // a closed transport is replaced on the next open
    client.open().await;
    assert_eq!(broker.attempts(), 2);
}

// ============================================================================
// Inbound frames
// ============================================================================

#[tokio::test]
async fn messages_reach_every_listener() {
    let (client, _broker, peer) = connected_client(ConnectOptions::default()).await;
    let mut a = client.events();
    let mut b = client.events();

    peer.push_text(message("/topic/x", "hello"));

    for stream in [&mut a, &mut b] {
        match stream.next().await {
            Some(Event::MessageReceived(m)) => {
                assert_eq!(m.destination, "/topic/x");
                assert_eq!(m.body.as_deref(), Some("hello"));
                assert_eq!(m.message_id(), Some("m-1"));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn error_frame_is_published() {
    let (client, _broker, peer) = connected_client(ConnectOptions::default()).await;
    let mut errors = client.errors();

    peer.push_text("ERROR\nmessage:bad destination\n\nno such queue\u{0}");
    let err = errors.next().await.expect("error");
    assert_eq!(err.description, "bad destination");
    assert_eq!(err.detail.as_deref(), Some("no such queue"));
    assert!(!client.is_connected().await);
    assert_eq!(client.state().await, ConnectionState::Connected);

    peer.push_text("ERROR\n\n\u{0}");
    let err = errors.next().await.expect("error");
    assert_eq!(err.description, "unknown error");
    assert_eq!(err.detail, None);
}

#[tokio::test]
async fn receipt_is_published() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;
    let mut receipts = client.receipts();

    client
        .send_message("/queue/a", "x", Headers::new(), Some("r-1"))
        .await;
    let send = next_frame(&mut peer).await;
    assert_eq!(send.get_header("receipt"), Some("r-1"));

    // a RECEIPT without an id is ignored
    peer.push_text("RECEIPT\n\n\u{0}");
    peer.push_text("RECEIPT\nreceipt-id:r-1\n\n\u{0}");
    assert_eq!(receipts.next().await.as_deref(), Some("r-1"));
}

#[tokio::test]
async fn heartbeat_frame_is_answered() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;
    let mut pings = client.pings();

    peer.push_text("\n");
    pings.next().await.expect("ping");
    assert_eq!(peer.recv().await.as_deref(), Some("\n"));
}

#[tokio::test]
async fn transport_pong_is_answered() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;
    let mut pings = client.pings();

    peer.pong();
    pings.next().await.expect("ping");
    assert_eq!(peer.recv().await.as_deref(), Some("\n"));
}

#[tokio::test]
async fn unknown_and_client_commands_are_ignored() {
    let (client, _broker, peer) = connected_client(ConnectOptions::default()).await;
    let mut events = client.events();

    peer.push_text("BOGUS\n\n\u{0}");
    peer.push_text("SEND\ndestination:/a\n\n\u{0}");
    peer.push_text("");
    peer.push_text(message("/a", "after"));

    match events.next().await {
        Some(Event::MessageReceived(m)) => assert_eq!(m.body.as_deref(), Some("after")),
        other => panic!("expected message, got {:?}", other),
    }
}

// ============================================================================
// Outbound frames
// ============================================================================

#[tokio::test]
async fn send_sets_length_and_default_content_type() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;

    client.send("/queue/a", "héllo").await;
    let f = next_frame(&mut peer).await;
    assert_eq!(f.command, Command::Send);
    assert_eq!(f.get_header("destination"), Some("/queue/a"));
    assert_eq!(f.get_header("content-length"), Some("6"));
    assert_eq!(f.get_header("content-type"), Some("text/plain"));
    assert_eq!(f.body.as_deref(), Some("héllo"));
}

#[tokio::test]
async fn send_keeps_caller_content_type_but_forces_destination() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;

    let mut headers = Headers::new();
    headers.insert("content-type".into(), "application/xml".into());
    headers.insert("destination".into(), "/queue/wrong".into());
    headers.insert("priority".into(), "9".into());
    client
        .send_message("/queue/right", "<a/>", headers, None)
        .await;

    let f = next_frame(&mut peer).await;
    assert_eq!(f.get_header("content-type"), Some("application/xml"));
    assert_eq!(f.get_header("destination"), Some("/queue/right"));
    assert_eq!(f.get_header("priority"), Some("9"));
    assert_eq!(f.get_header("receipt"), None);
}

#[derive(Serialize)]
struct Order {
    id: u32,
    item: String,
}

#[tokio::test]
async fn send_json_uses_json_content_type() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;

    client
        .send_json(
            "/queue/orders",
            &Order {
                id: 7,
                item: "tea".into(),
            },
        )
        .await
        .expect("serializable");

    let f = next_frame(&mut peer).await;
    assert_eq!(
        f.get_header("content-type"),
        Some("application/json;charset=UTF-8")
    );
    assert_eq!(f.body.as_deref(), Some(r#"{"id":7,"item":"tea"}"#));
    assert_eq!(f.get_header("content-length"), Some("21"));
}

#[tokio::test]
async fn transactions_and_ack() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;

    client.begin("tx-1").await;
    client.ack("m-1", Some("sub-1")).await;
    client.commit("tx-1").await;
    client.abort("tx-2").await;
    client.ack("m-2", None).await;

    let begin = next_frame(&mut peer).await;
    assert_eq!(begin.command, Command::Begin);
    assert_eq!(begin.get_header("transaction"), Some("tx-1"));

    let ack = next_frame(&mut peer).await;
    assert_eq!(ack.command, Command::Ack);
    assert_eq!(ack.get_header("id"), Some("m-1"));
    assert_eq!(ack.get_header("subscription"), Some("sub-1"));

    assert_eq!(next_frame(&mut peer).await.command, Command::Commit);

    let abort = next_frame(&mut peer).await;
    assert_eq!(abort.command, Command::Abort);
    assert_eq!(abort.get_header("transaction"), Some("tx-2"));
    assert_eq!(abort.headers.len(), 1);

    let ack = next_frame(&mut peer).await;
    assert_eq!(ack.get_header("subscription"), None);
}

#[tokio::test]
async fn send_after_close_is_an_implicit_disconnect() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;
    let mut disconnects = client.disconnected_events();

    peer.close(1001, "going away");
    disconnects.next().await.expect("disconnect from close");
    assert_eq!(client.state().await, ConnectionState::Closed);

    client.send("/queue/a", "lost").await;
    disconnects.next().await.expect("disconnect from send");
    assert!(!client.is_connected().await);
    assert!(peer.try_recv().is_none());

    // exactly one per dropped frame
    let extra = tokio::time::timeout(Duration::from_millis(100), disconnects.next()).await;
    assert!(extra.is_err(), "unexpected second disconnect");
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn disconnect_sends_frame_and_emits_once() {
    let (client, _broker, mut peer) = connected_client(ConnectOptions::default()).await;
    let mut events = client.events();

    client.disconnect().await;

    let f = next_frame(&mut peer).await;
    assert_eq!(f.command, Command::Disconnect);
    let stamp: u64 = f
        .get_header("disconnected")
        .and_then(|v| v.parse().ok())
        .expect("epoch seconds");
    assert!(stamp > 1_577_836_800);

    assert_eq!(events.next().await, Some(Event::Disconnected));
    assert!(!client.is_connected().await);
    assert_eq!(client.state().await, ConnectionState::Closed);

    // the transport's own close notification belongs to a dropped transport
    let extra = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
    assert!(extra.is_err(), "unexpected event {:?}", extra);
}

#[tokio::test]
async fn disconnect_without_transport_still_emits() {
    let (connector, _broker) = MemoryConnector::new();
    let client = StompClient::new(ConnectOptions::default(), connector);
    let mut events = client.disconnected_events();
    client.disconnect().await;
    events.next().await.expect("disconnect");
}

#[tokio::test]
async fn events_from_replaced_transport_are_ignored() {
    let (client, mut broker, old_peer) = connected_client(ConnectOptions::default()).await;
    let mut disconnects = client.disconnected_events();

    old_peer.close(1006, "dropped");
    disconnects.next().await.expect("disconnect");

    let new_peer = handshake(&client, &mut broker).await;
    let mut events = client.events();

    old_peer.push_text(message("/a", "stale"));
    old_peer.push_text(CONNECTED);
    new_peer.push_text(message("/a", "fresh"));

    match events.next().await {
        Some(Event::MessageReceived(m)) => assert_eq!(m.body.as_deref(), Some("fresh")),
        other => panic!("expected fresh message, got {:?}", other),
    }
    assert_eq!(broker.attempts(), 2);
}
