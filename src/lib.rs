//! Async STOMP client over WebSocket.
//!
//! Frames travel as text WebSocket messages, one frame per message. The
//! client never waits on the network: it queues outbound frames and reports
//! everything that happens through event streams.
//!
//! ```no_run
//! use futures::StreamExt;
//! use stomp_ws::{ConnectOptions, StompClient};
//!
//! # async fn demo() {
//! let client = StompClient::websocket(
//!     ConnectOptions::new("ws://127.0.0.1:15674/ws")
//!         .with_connect_header("login", "guest")
//!         .with_connect_header("passcode", "guest"),
//! );
//! let mut connected = client.connected_events();
//! client.open().await;
//! connected.next().await;
//!
//! let mut messages = client.subscribe_raw("/topic/news").await;
//! client.send("/topic/news", "hello").await;
//! if let Some(msg) = messages.next().await {
//!     println!("{:?}", msg.body);
//! }
//! client.disconnect().await;
//! # }
//! ```

pub mod codec;
pub mod command;
pub mod connection;
pub mod event;
pub mod frame;
pub mod reconnect;
pub mod subscription;
pub mod transport;

pub use codec::{decode, encode};
pub use command::{AckMode, Command};
pub use connection::{ConnError, ConnectOptions, ConnectionState, StompClient};
pub use event::{Event, EventStream, Message, ServerError};
pub use frame::{Frame, Headers};
pub use subscription::Subscription;
pub use transport::{Connector, ReadyState, Transport, TransportEvent, WsRequest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_frame_display() {
        let f = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .set_body("hello");
        let s = format!("{}", f);
        assert!(s.contains("CONNECT"));
        assert!(s.contains("Body (5 bytes)"));
    }
}
