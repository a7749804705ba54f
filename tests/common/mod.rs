#![allow(dead_code)]

use futures::StreamExt;
use stomp_ws::transport::memory::{MemoryBroker, MemoryConnector, MemoryPeer};
use stomp_ws::{ConnectOptions, Frame, StompClient, decode};

pub const CONNECTED: &str = "CONNECTED\nversion:1.2\nsession:sess-1\n\n\u{0}";

/// Open a client against the memory transport and complete the STOMP
/// handshake. Returns the client, the broker handle and the live peer.
pub async fn connected_client(options: ConnectOptions) -> (StompClient, MemoryBroker, MemoryPeer) {
    let (connector, mut broker) = MemoryConnector::new();
    let client = StompClient::new(options, connector);
    let peer = handshake(&client, &mut broker).await;
    (client, broker, peer)
}

/// Open (or reopen) the client, accept the transport and answer CONNECT.
pub async fn handshake(client: &StompClient, broker: &mut MemoryBroker) -> MemoryPeer {
    let mut connected = client.connected_events();
    client.open().await;
    let mut peer = broker.accept().await.expect("transport");
    peer.open();
    let connect = next_frame(&mut peer).await;
    assert_eq!(connect.command, stomp_ws::Command::Connect);
    peer.push_text(CONNECTED);
    connected.next().await.expect("connected event");
    peer
}

/// Next frame the client sent to `peer`.
pub async fn next_frame(peer: &mut MemoryPeer) -> Frame {
    let text = peer.recv().await.expect("client sent nothing");
    decode(&text).expect("undecodable frame")
}

pub fn message(destination: &str, body: &str) -> String {
    format!("MESSAGE\ndestination:{destination}\nmessage-id:m-1\nsubscription:{destination}\n\n{body}\u{0}")
}
