//! In-process transport for driving a client without a broker.
//!
//! `MemoryConnector` hands out transports whose far end is a `MemoryPeer`
//! owned by the test (or embedding application). The peer decides when the
//! transport opens, pushes inbound text, and reads what the client sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::{Connector, ReadyState, SharedReadyState, Transport, TransportEvent, WsRequest};
use crate::connection::ConnError;

/// What a freshly connected memory transport does on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OpenBehavior {
    /// Stay `Connecting` until the peer calls `MemoryPeer::open`.
    #[default]
    Manual,
    /// Open immediately.
    Immediate,
    /// Fail immediately with the given error text.
    Fail(String),
}

/// `Connector` producing in-memory transports.
#[derive(Clone)]
pub struct MemoryConnector {
    behavior: OpenBehavior,
    attempts: Arc<AtomicUsize>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Receives the far end of every transport the connector opens.
pub struct MemoryBroker {
    attempts: Arc<AtomicUsize>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryBroker) {
        Self::with_behavior(OpenBehavior::Manual)
    }

    pub fn with_behavior(behavior: OpenBehavior) -> (Self, MemoryBroker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                behavior,
                attempts: attempts.clone(),
                peers: tx,
            },
            MemoryBroker {
                attempts,
                peers: rx,
            },
        )
    }
}

impl MemoryBroker {
    /// Wait for the next transport the client opens.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// The next already-opened transport, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }

    /// How many times `Connector::connect` has been called.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        request: &WsRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Box<dyn Transport> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let state = SharedReadyState::new(ReadyState::Connecting);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        match &self.behavior {
            OpenBehavior::Manual => {}
            OpenBehavior::Immediate => {
                state.set(ReadyState::Open);
                let _ = events.send(TransportEvent::Opened);
            }
            OpenBehavior::Fail(reason) => {
                state.set(ReadyState::Closed);
                let _ = events.send(TransportEvent::Failed(reason.clone()));
            }
        }

        let peer = MemoryPeer {
            request: request.clone(),
            state: state.clone(),
            events: events.clone(),
            outbound: out_rx,
        };
        let _ = self.peers.send(peer);

        Box::new(MemoryTransport {
            state,
            events,
            outbound: out_tx,
        })
    }
}

struct MemoryTransport {
    state: SharedReadyState,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Transport for MemoryTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: String) -> Result<(), ConnError> {
        if self.state.get() != ReadyState::Open {
            return Err(ConnError::NotConnected);
        }
        self.outbound
            .send(text)
            .map_err(|_| ConnError::Transport("peer dropped".into()))
    }

    fn close(&self) {
        if self.state.advance(ReadyState::Closed) != ReadyState::Closed {
            let _ = self.events.send(TransportEvent::Closed {
                code: 1000,
                reason: String::new(),
                was_clean: true,
            });
        }
    }
}

/// The broker side of a memory transport.
pub struct MemoryPeer {
    request: WsRequest,
    state: SharedReadyState,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// The request the client opened this transport with.
    pub fn request(&self) -> &WsRequest {
        &self.request
    }

    pub fn state(&self) -> ReadyState {
        self.state.get()
    }

    /// Complete the opening handshake.
    pub fn open(&self) {
        self.state.set(ReadyState::Open);
        let _ = self.events.send(TransportEvent::Opened);
    }

    /// Deliver one inbound text message to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into()));
    }

    /// Deliver a WebSocket pong.
    pub fn pong(&self) {
        let _ = self.events.send(TransportEvent::Pong);
    }

    /// Close from the broker side.
    pub fn close(&self, code: u16, reason: &str) {
        if self.state.advance(ReadyState::Closed) != ReadyState::Closed {
            let _ = self.events.send(TransportEvent::Closed {
                code,
                reason: reason.to_string(),
                was_clean: true,
            });
        }
    }

    /// Fail the transport with an error.
    pub fn fail(&self, reason: &str) {
        self.state.set(ReadyState::Closed);
        let _ = self.events.send(TransportEvent::Failed(reason.to_string()));
    }

    /// Wait for the next text message the client sent.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// The next text message the client sent, if one is queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }
}
