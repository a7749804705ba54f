//! WebSocket transport built on `tokio-tungstenite`.

use futures::{SinkExt, StreamExt, future};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

use super::{Connector, ReadyState, SharedReadyState, Transport, TransportEvent, WsRequest};
use crate::connection::ConnError;

/// Close code reported when the socket drops without a close handshake.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Opens real WebSocket connections.
///
/// Each transport runs on its own spawned task, so `connect` must be called
/// from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    keepalive: Option<Duration>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a WebSocket ping every `interval`. The broker's pong is reported
    /// as `TransportEvent::Pong`, which the client treats as a heartbeat.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct WsTransport {
    state: SharedReadyState,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: String) -> Result<(), ConnError> {
        if self.state.get() != ReadyState::Open {
            return Err(ConnError::NotConnected);
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| ConnError::Transport("websocket task has exited".into()))
    }

    fn close(&self) {
        if self.state.advance(ReadyState::Closing) != ReadyState::Closed {
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        request: &WsRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Box<dyn Transport> {
        let state = SharedReadyState::new(ReadyState::Connecting);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(
            request.clone(),
            self.keepalive,
            state.clone(),
            events,
            out_rx,
        ));
        Box::new(WsTransport {
            state,
            outbound: out_tx,
        })
    }
}

fn build_request(request: &WsRequest) -> Result<Request, ConnError> {
    let mut req = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ConnError::InvalidRequest(format!("{}: {}", request.url, e)))?;
    for (k, v) in &request.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| ConnError::InvalidRequest(format!("header name '{}': {}", k, e)))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| ConnError::InvalidRequest(format!("header value for '{}': {}", k, e)))?;
        req.headers_mut().insert(name, value);
    }
    Ok(req)
}

async fn run(
    request: WsRequest,
    keepalive: Option<Duration>,
    state: SharedReadyState,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let fail = |state: &SharedReadyState, reason: String| {
        state.set(ReadyState::Closed);
        let _ = events.send(TransportEvent::Failed(reason));
    };

    let req = match build_request(&request) {
        Ok(r) => r,
        Err(e) => return fail(&state, e.to_string()),
    };

    tracing::debug!(url = %request.url, "opening websocket");
    let ws = match connect_async(req).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::debug!(url = %request.url, error = %e, "websocket handshake failed");
            return fail(&state, e.to_string());
        }
    };

    let (mut sink, mut stream) = ws.split();

    if state.get() != ReadyState::Connecting {
        // closed while the handshake was in flight
        let _ = sink.close().await;
        state.set(ReadyState::Closed);
        let _ = events.send(TransportEvent::Closed {
            code: 1000,
            reason: String::new(),
            was_clean: true,
        });
        return;
    }
    state.set(ReadyState::Open);
    let _ = events.send(TransportEvent::Opened);

    let mut ping_tick = keepalive.map(tokio::time::interval);

    let (code, reason, was_clean) = loop {
        tokio::select! {
            maybe = outbound.recv() => {
                match maybe {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::text(text)).await {
                            break (ABNORMAL_CLOSURE, e.to_string(), false);
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        break (1000, String::new(), true);
                    }
                }
            }
            item = stream.next() => {
                match item {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            let _ = events.send(TransportEvent::Text(text));
                        }
                        Err(_) => tracing::warn!(len = data.len(), "dropping non-UTF-8 binary message"),
                    },
                    Some(Ok(Message::Pong(_))) => {
                        let _ = events.send(TransportEvent::Pong);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                            .unwrap_or((1005, String::new()));
                        break (code, reason, true);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break (ABNORMAL_CLOSURE, e.to_string(), false),
                    None => break (ABNORMAL_CLOSURE, String::new(), false),
                }
            }
            _ = async {
                match ping_tick.as_mut() {
                    Some(tick) => { tick.tick().await; }
                    None => future::pending::<()>().await,
                }
            } => {
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    break (ABNORMAL_CLOSURE, e.to_string(), false);
                }
            }
        }
    };

    state.set(ReadyState::Closed);
    tracing::debug!(url = %request.url, code, %reason, was_clean, "websocket closed");
    let _ = events.send(TransportEvent::Closed {
        code,
        reason,
        was_clean,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_handshake_headers() {
        let req = WsRequest::new("ws://localhost:15674/ws").header("Authorization", "Bearer t");
        let built = build_request(&req).expect("request");
        assert_eq!(
            built
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer t")
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = build_request(&WsRequest::new("not a url")).expect_err("should fail");
        assert!(matches!(err, ConnError::InvalidRequest(_)));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let req = WsRequest::new("ws://localhost/ws").header("bad header", "x");
        assert!(matches!(
            build_request(&req),
            Err(ConnError::InvalidRequest(_))
        ));
    }
}
