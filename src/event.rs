use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::command::header;
use crate::frame::{Frame, Headers};

/// Stream of dispatcher events handed to a listener.
pub type EventStream = BoxStream<'static, Event>;

/// An inbound MESSAGE frame, routed by its own `destination` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Value of the frame's `destination` header, empty when absent.
    pub destination: String,
    pub headers: Headers,
    /// Raw text body, `None` when the frame had none.
    pub body: Option<String>,
}

impl Message {
    pub(crate) fn from_frame(frame: Frame) -> Self {
        let destination = frame
            .get_header(header::DESTINATION)
            .unwrap_or_default()
            .to_string();
        Self {
            destination,
            headers: frame.headers,
            body: frame.body,
        }
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// The `message-id` header, needed to ACK in client ack modes.
    pub fn message_id(&self) -> Option<&str> {
        self.get_header(header::MESSAGE_ID)
    }

    /// The `subscription` header set by the broker.
    pub fn subscription(&self) -> Option<&str> {
        self.get_header(header::SUBSCRIPTION)
    }
}

/// An error reported to listeners: either an ERROR frame from the broker or
/// a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Short description (the ERROR frame's `message` header, or the
    /// transport error text).
    pub description: String,
    /// Optional detail (the ERROR frame body).
    pub detail: Option<String>,
}

impl ServerError {
    pub(crate) fn from_frame(frame: Frame) -> Self {
        let description = frame
            .get_header(header::MESSAGE)
            .unwrap_or("unknown error")
            .to_string();
        Self {
            description,
            detail: frame.body,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.description, detail),
            None => f.write_str(&self.description),
        }
    }
}

impl std::error::Error for ServerError {}

/// Everything a listener can observe on a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MessageReceived(Message),
    Connected,
    Disconnected,
    ReceiptReceived { receipt_id: String },
    ErrorReceived(ServerError),
    PingReceived,
}

type Filter = Box<dyn Fn(&Event) -> bool + Send + Sync>;

struct Listener {
    tx: mpsc::UnboundedSender<Event>,
    /// Events failing the filter are never queued for this listener.
    filter: Option<Filter>,
}

/// Multicast fan-out of events to every registered listener.
///
/// Each listener owns an unbounded queue, so a slow listener never holds
/// back the others and never loses events. Listeners whose stream was
/// dropped are pruned on the next publish.
#[derive(Clone, Default)]
pub struct Dispatcher {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish one event to all current listeners, in registration order.
    /// Events published while nobody listens are discarded.
    pub fn publish(&self, event: Event) {
        let mut listeners = self.lock();
        listeners.retain(|l| match &l.filter {
            Some(filter) if !filter(&event) => !l.tx.is_closed(),
            _ => l.tx.send(event.clone()).is_ok(),
        });
        tracing::trace!(?event, listeners = listeners.len(), "dispatch");
    }

    fn register(&self, filter: Option<Filter>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Listener { tx, filter });
        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }

    /// Register a listener that receives every event published from now on.
    pub fn listen(&self) -> EventStream {
        self.register(None)
    }

    /// Register a listener that only queues the events `filter` accepts.
    pub fn listen_where<P>(&self, filter: P) -> EventStream
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.register(Some(Box::new(filter)))
    }
}
