//! The transport contract the client drives.
//!
//! A `Connector` opens transports; a `Transport` is one opened (or opening)
//! WebSocket. Neither blocks: opening progress, inbound text, closes and
//! failures arrive asynchronously as `TransportEvent`s on the channel handed
//! to `Connector::connect`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

use crate::connection::ConnError;

pub mod memory;
#[cfg(feature = "websocket")]
pub mod ws;

/// Describes the WebSocket to open: the URL plus extra handshake headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl WsRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a handshake header (builder style).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Lifecycle of a single transport, mirroring the WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Notifications delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    Failed(String),
    Pong,
}

/// One WebSocket connection.
pub trait Transport: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Queue one text message. Fails when the transport is not open.
    fn send(&self, text: String) -> Result<(), ConnError>;

    /// Begin closing. Idempotent.
    fn close(&self);
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Start opening a transport for `request`. Returns immediately; the
    /// outcome is reported on `events`.
    fn connect(
        &self,
        request: &WsRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Box<dyn Transport>;
}

/// `ReadyState` shared between a transport handle and the task driving it.
#[derive(Debug, Clone)]
pub(crate) struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    pub(crate) fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub(crate) fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `to` unless already `Closed`; returns the previous state.
    pub(crate) fn advance(&self, to: ReadyState) -> ReadyState {
        let prev = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (cur != ReadyState::Closed as u8).then_some(to as u8)
            });
        match prev {
            Ok(p) | Err(p) => ReadyState::from_u8(p),
        }
    }
}
