use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::codec;
use crate::command::{ACCEPT_VERSION, AckMode, Command, PING, content_type, header};
use crate::event::{Dispatcher, Event, EventStream, Message, ServerError};
use crate::frame::{Frame, Headers};
use crate::reconnect::Reconnector;
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::transport::{Connector, ReadyState, Transport, TransportEvent, WsRequest};

/// URL used by `ConnectOptions::default()` (RabbitMQ Web-STOMP on localhost).
pub const DEFAULT_URL: &str = "ws://127.0.0.1:15674/ws";

/// Errors produced by the client.
///
/// Frame-sending methods never return these: transport problems are
/// reported as `Event::ErrorReceived` or `Event::Disconnected` instead.
#[derive(Error, Debug)]
pub enum ConnError {
    /// Transport open/send failure
    #[error("transport error: {0}")]
    Transport(String),
    /// A frame was sent while the transport was not open
    #[error("transport is not open")]
    NotConnected,
    /// The WebSocket request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Serializing an outbound payload failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A typed subscription received a body it could not decode
    #[error("cannot decode payload from '{destination}': {source}")]
    Payload {
        destination: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Protocol-level lifecycle of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport was ever opened.
    Idle,
    /// A transport was requested; no CONNECTED frame yet.
    Connecting,
    /// The broker answered with CONNECTED.
    Connected,
    /// The transport closed, failed, or `disconnect` was called.
    Closed,
}

/// Options used to open and drive a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// WebSocket URL and handshake headers.
    pub request: WsRequest,
    /// Headers for the CONNECT frame. `accept-version` is always overwritten.
    pub connect_headers: Headers,
    /// Period used by `StompClient::start_reconnect`.
    pub reconnect_interval: Duration,
    /// Replay every registered subscription after each CONNECTED frame.
    pub resubscribe: bool,
    /// Log JSON bodies of typed sends and subscriptions at debug level.
    pub log_payloads: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            request: WsRequest::new(url),
            connect_headers: Headers::new(),
            reconnect_interval: Duration::from_secs(1),
            resubscribe: false,
            log_payloads: false,
        }
    }

    /// Add a header to the WebSocket handshake request.
    pub fn with_http_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.header(key, value);
        self
    }

    /// Add a header to the STOMP CONNECT frame (`login`, `passcode`, `heart-beat`, ...).
    pub fn with_connect_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.connect_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_resubscribe(mut self, enabled: bool) -> Self {
        self.resubscribe = enabled;
        self
    }

    pub fn with_log_payloads(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }
}

/// Mutable connection state, guarded by one mutex.
struct ClientState {
    transport: Option<Box<dyn Transport>>,
    /// Bumped for every transport opened; events tagged with an older
    /// generation belong to a superseded transport.
    generation: u64,
    phase: ConnectionState,
    /// Optimistic "in use" flag: set when a connection is requested. Cleared
    /// by close, failure, ERROR, unsubscribe, disconnect and by a send on a
    /// closed transport.
    connected: bool,
    session_id: Option<String>,
    registry: SubscriptionRegistry,
}

struct Shared {
    options: ConnectOptions,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    state: Mutex<ClientState>,
    reconnector: Mutex<Option<Reconnector>>,
}

/// STOMP client over a WebSocket transport.
///
/// `StompClient` is a cheap handle: clones share the same connection, event
/// dispatcher, and subscription registry. None of its methods wait on the
/// network; outcomes are observed through the event streams.
#[derive(Clone)]
pub struct StompClient {
    shared: Arc<Shared>,
}

impl StompClient {
    /// Create a client that opens transports through `connector`. Nothing is
    /// opened until `open` (or a reconnect tick) is called.
    pub fn new(options: ConnectOptions, connector: impl Connector + 'static) -> Self {
        let dispatcher = Dispatcher::new();
        Self {
            shared: Arc::new(Shared {
                options,
                connector: Arc::new(connector),
                dispatcher,
                state: Mutex::new(ClientState {
                    transport: None,
                    generation: 0,
                    phase: ConnectionState::Idle,
                    connected: false,
                    session_id: None,
                    registry: SubscriptionRegistry::new(),
                }),
                reconnector: Mutex::new(None),
            }),
        }
    }

    /// Create a client backed by real WebSockets.
    #[cfg(feature = "websocket")]
    pub fn websocket(options: ConnectOptions) -> Self {
        Self::new(options, crate::transport::ws::WsConnector::new())
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.shared.options
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open the transport unless one is already open or opening. The CONNECT
    /// frame goes out once the transport reports it is open.
    ///
    /// The connected flag is set immediately, before the broker has answered;
    /// use `state()` to distinguish "requested" from "confirmed".
    pub async fn open(&self) {
        let mut st = self.shared.state.lock().await;
        let reusable = st
            .transport
            .as_ref()
            .is_some_and(|t| t.ready_state() != ReadyState::Closed);
        if !reusable {
            st.generation += 1;
            let generation = st.generation;
            let (tx, rx) = mpsc::unbounded_channel();
            tracing::debug!(url = %self.shared.options.request.url, generation, "opening transport");
            st.transport = Some(self.shared.connector.connect(&self.shared.options.request, tx));
            st.phase = ConnectionState::Connecting;
            tokio::spawn(pump(Arc::downgrade(&self.shared), generation, rx));
        }
        st.connected = true;
    }

    /// Send DISCONNECT (stamped with the current epoch seconds) and close the
    /// transport. Emits `Disconnected`.
    pub async fn disconnect(&self) {
        let mut st = self.shared.state.lock().await;
        st.connected = false;
        let open = st
            .transport
            .as_ref()
            .is_some_and(|t| t.ready_state() == ReadyState::Open);
        if open {
            let frame =
                Frame::new(Command::Disconnect).header(header::DISCONNECTED, epoch_secs().to_string());
            self.shared.send_locked(&mut st, &frame);
        }
        if let Some(transport) = st.transport.take() {
            transport.close();
        }
        st.phase = ConnectionState::Closed;
        tracing::info!("disconnected");
        self.shared.dispatcher.publish(Event::Disconnected);
    }

    /// Disconnect once `delay` has elapsed. Abort the returned handle to cancel.
    pub fn disconnect_after(&self, delay: Duration) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client.disconnect().await;
        })
    }

    /// The optimistic connected flag (see `open`).
    pub async fn is_connected(&self) -> bool {
        self.shared.state.lock().await.connected
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.state.lock().await.phase
    }

    /// Session id from the last CONNECTED frame. Kept across disconnects
    /// until the next CONNECTED replaces it.
    pub async fn session_id(&self) -> Option<String> {
        self.shared.state.lock().await.session_id.clone()
    }

    /// Snapshot of the subscription registry.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.state.lock().await.registry.snapshot()
    }

    // ------------------------------------------------------------------
    // Reconnection
    // ------------------------------------------------------------------

    /// Re-open the transport every `reconnect_interval` while not connected.
    pub async fn start_reconnect(&self) {
        self.start_reconnect_every(self.shared.options.reconnect_interval)
            .await;
    }

    /// Re-open the transport every `period` while not connected. Replaces a
    /// running reconnect loop.
    pub async fn start_reconnect_every(&self, period: Duration) {
        let weak = Arc::downgrade(&self.shared);
        let reconnector = Reconnector::spawn(period, move || {
            let weak = weak.clone();
            async move {
                let Some(shared) = weak.upgrade() else {
                    return false;
                };
                let client = StompClient { shared };
                if !client.is_connected().await {
                    tracing::debug!("not connected, reopening transport");
                    client.open().await;
                }
                true
            }
        });
        let mut slot = self.shared.reconnector.lock().await;
        if let Some(previous) = slot.replace(reconnector) {
            previous.stop();
        }
    }

    /// Cancel the reconnect loop, if any.
    pub async fn stop_reconnect(&self) {
        if let Some(reconnector) = self.shared.reconnector.lock().await.take() {
            reconnector.stop();
        }
    }

    // ------------------------------------------------------------------
    // Outbound frames
    // ------------------------------------------------------------------

    /// Send an arbitrary frame. When the transport is not open the frame is
    /// dropped, the connected flag is cleared and `Disconnected` is emitted.
    pub async fn send_frame(&self, frame: Frame) {
        let mut st = self.shared.state.lock().await;
        self.shared.send_locked(&mut st, &frame);
    }

    /// Send a text message to `destination` with `text/plain` content type.
    pub async fn send(&self, destination: &str, body: &str) {
        self.send_message(destination, body, Headers::new(), None)
            .await;
    }

    /// Send a message with caller headers and an optional receipt request.
    ///
    /// `destination` and `content-length` are always set by the client;
    /// `content-type` defaults to `text/plain` when the caller gave none.
    pub async fn send_message(
        &self,
        destination: &str,
        body: &str,
        headers: Headers,
        receipt: Option<&str>,
    ) {
        let mut frame = Frame::new(Command::Send).headers(headers);
        if let Some(receipt) = receipt {
            frame = frame.header(header::RECEIPT, receipt);
        }
        frame = frame
            .header(header::DESTINATION, destination)
            .header(header::CONTENT_LENGTH, body.len().to_string());
        frame
            .headers
            .entry(header::CONTENT_TYPE.to_string())
            .or_insert_with(|| content_type::TEXT.to_string());
        self.send_frame(frame.set_body(body)).await;
    }

    /// Serialize `payload` as JSON and send it to `destination`.
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        destination: &str,
        payload: &T,
    ) -> Result<(), ConnError> {
        let body = serde_json::to_string(payload)?;
        if self.shared.options.log_payloads {
            tracing::debug!(destination, body = %body, "sending json");
        }
        let mut headers = Headers::new();
        headers.insert(header::CONTENT_TYPE.to_string(), content_type::JSON.to_string());
        self.send_message(destination, &body, headers, None).await;
        Ok(())
    }

    /// Subscribe to `destination`. The subscription id is the destination
    /// itself (empty for an anonymous subscription). Marks the connection as
    /// in use.
    pub async fn subscribe(&self, destination: &str, ack: AckMode) {
        let mut st = self.shared.state.lock().await;
        st.connected = true;
        let sub = Subscription::new(destination, ack);
        let frame = sub.to_frame();
        st.registry.insert(sub);
        self.shared.send_locked(&mut st, &frame);
    }

    /// Subscribe with caller-supplied headers. The `destination` header is
    /// always replaced by `destination`.
    pub async fn subscribe_with_headers(&self, destination: &str, headers: Headers) {
        let mut st = self.shared.state.lock().await;
        let sub = Subscription::with_headers(destination, headers);
        let frame = sub.to_frame();
        st.registry.insert(sub);
        self.shared.send_locked(&mut st, &frame);
    }

    /// Unsubscribe the subscription whose id is `destination`.
    ///
    /// This also clears the connected flag, even when other subscriptions
    /// remain; a running reconnect loop will then reopen the transport.
    pub async fn unsubscribe(&self, destination: &str) {
        let mut st = self.shared.state.lock().await;
        st.connected = false;
        st.registry.remove(destination);
        let frame = Frame::new(Command::Unsubscribe).header(header::ID, destination);
        self.shared.send_locked(&mut st, &frame);
    }

    async fn send_transaction_frame(&self, command: Command, transaction_id: &str) {
        self.send_frame(Frame::new(command).header(header::TRANSACTION, transaction_id))
            .await;
    }

    pub async fn begin(&self, transaction_id: &str) {
        self.send_transaction_frame(Command::Begin, transaction_id)
            .await;
    }

    pub async fn commit(&self, transaction_id: &str) {
        self.send_transaction_frame(Command::Commit, transaction_id)
            .await;
    }

    pub async fn abort(&self, transaction_id: &str) {
        self.send_transaction_frame(Command::Abort, transaction_id)
            .await;
    }

    /// Acknowledge a message received in `client` or `client-individual`
    /// mode, optionally naming the subscription it arrived on.
    pub async fn ack(&self, message_id: &str, subscription: Option<&str>) {
        let mut frame = Frame::new(Command::Ack).header(header::ID, message_id);
        if let Some(subscription) = subscription {
            frame = frame.header(header::SUBSCRIPTION, subscription);
        }
        self.send_frame(frame).await;
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Every event from now on.
    pub fn events(&self) -> EventStream {
        self.shared.dispatcher.listen()
    }

    /// Listener that only queues the events `accept` admits, so unrelated
    /// traffic never piles up behind it.
    fn listen_for<T: Send + 'static>(
        &self,
        accept: impl Fn(&Event) -> bool + Send + Sync + 'static,
        extract: fn(Event) -> Option<T>,
    ) -> BoxStream<'static, T> {
        self.shared
            .dispatcher
            .listen_where(accept)
            .filter_map(move |e| futures::future::ready(extract(e)))
            .boxed()
    }

    pub fn connected_events(&self) -> BoxStream<'static, ()> {
        self.listen_for(
            |e| matches!(e, Event::Connected),
            |_| Some(()),
        )
    }

    pub fn disconnected_events(&self) -> BoxStream<'static, ()> {
        self.listen_for(
            |e| matches!(e, Event::Disconnected),
            |_| Some(()),
        )
    }

    pub fn pings(&self) -> BoxStream<'static, ()> {
        self.listen_for(
            |e| matches!(e, Event::PingReceived),
            |_| Some(()),
        )
    }

    /// Receipt ids confirmed by the broker.
    pub fn receipts(&self) -> BoxStream<'static, String> {
        self.listen_for(
            |e| matches!(e, Event::ReceiptReceived { .. }),
            |e| match e {
                Event::ReceiptReceived { receipt_id } => Some(receipt_id),
                _ => None,
            },
        )
    }

    /// Broker ERROR frames and transport failures.
    pub fn errors(&self) -> BoxStream<'static, ServerError> {
        self.listen_for(
            |e| matches!(e, Event::ErrorReceived(_)),
            |e| match e {
                Event::ErrorReceived(err) => Some(err),
                _ => None,
            },
        )
    }

    /// Subscribe to `destination` with automatic ack and return the stream of
    /// messages whose `destination` header matches it.
    ///
    /// Messages for other destinations are filtered out before they are
    /// queued, so busy neighbours cannot crowd this stream.
    pub async fn subscribe_raw(&self, destination: &str) -> BoxStream<'static, Message> {
        let wanted = destination.to_string();
        // listen before subscribing so the first message cannot be missed
        let stream = self.listen_for(
            move |e| matches!(e, Event::MessageReceived(m) if m.destination == wanted),
            |e| match e {
                Event::MessageReceived(m) => Some(m),
                _ => None,
            },
        );
        self.subscribe(destination, AckMode::Auto).await;
        stream
    }

    /// Subscribe to `destination` and decode every message body as JSON.
    ///
    /// A body that does not decode as `T` yields `Err(ConnError::Payload)`;
    /// the stream keeps going.
    pub async fn subscribe_json<T>(
        &self,
        destination: &str,
    ) -> BoxStream<'static, Result<T, ConnError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let log_payloads = self.shared.options.log_payloads;
        self.subscribe_raw(destination)
            .await
            .map(move |msg| {
                let body = msg.body.as_deref().unwrap_or_default();
                if log_payloads {
                    tracing::debug!(destination = %msg.destination, body, "received json");
                }
                serde_json::from_str(body).map_err(|source| {
                    tracing::warn!(destination = %msg.destination, error = %source, "payload decoding failed");
                    ConnError::Payload {
                        destination: msg.destination.clone(),
                        source,
                    }
                })
            })
            .boxed()
    }
}

impl Shared {
    /// Encode and send `frame`, or treat the attempt as an implicit
    /// disconnect when the transport is not open.
    fn send_locked(&self, st: &mut ClientState, frame: &Frame) {
        let result = match st.transport.as_ref() {
            Some(t) if t.ready_state() == ReadyState::Open => {
                tracing::trace!(command = %frame.command, "sending frame");
                t.send(codec::encode(frame))
            }
            _ => Err(ConnError::NotConnected),
        };
        match result {
            Ok(()) => {}
            Err(ConnError::NotConnected) => {
                tracing::debug!(command = %frame.command, "transport not open, frame dropped");
                st.connected = false;
                self.dispatcher.publish(Event::Disconnected);
            }
            Err(e) => {
                tracing::warn!(command = %frame.command, error = %e, "send failed");
                self.dispatcher.publish(Event::ErrorReceived(ServerError {
                    description: e.to_string(),
                    detail: None,
                }));
            }
        }
    }

    fn connect_frame(&self) -> Frame {
        Frame::new(Command::Connect)
            .headers(self.options.connect_headers.clone())
            .header(header::ACCEPT_VERSION, ACCEPT_VERSION)
    }

    async fn handle_transport_event(&self, generation: u64, event: TransportEvent) {
        let mut st = self.state.lock().await;
        if generation != st.generation || st.transport.is_none() {
            tracing::trace!(generation, ?event, "ignoring event from superseded transport");
            return;
        }

        match event {
            TransportEvent::Opened => {
                tracing::debug!(generation, "transport open, sending CONNECT");
                let frame = self.connect_frame();
                self.send_locked(&mut st, &frame);
            }
            TransportEvent::Text(text) => match codec::decode(&text) {
                Some(frame) => self.handle_frame(&mut st, frame),
                None => tracing::debug!("dropping message without a command line"),
            },
            TransportEvent::Pong => self.handle_heartbeat(&st),
            TransportEvent::Closed {
                code,
                reason,
                was_clean,
            } => {
                tracing::info!(code, %reason, was_clean, "transport closed");
                st.phase = ConnectionState::Closed;
                st.connected = false;
                self.dispatcher.publish(Event::Disconnected);
            }
            TransportEvent::Failed(reason) => {
                tracing::warn!(%reason, "transport failed");
                st.phase = ConnectionState::Closed;
                st.connected = false;
                self.dispatcher.publish(Event::ErrorReceived(ServerError {
                    description: reason,
                    detail: None,
                }));
            }
        }
    }

    fn handle_frame(&self, st: &mut ClientState, frame: Frame) {
        match frame.command {
            Command::Connected => {
                if let Some(session) = frame.get_header(header::SESSION) {
                    st.session_id = Some(session.to_string());
                }
                st.phase = ConnectionState::Connected;
                tracing::info!(session = ?st.session_id, "connected");
                self.dispatcher.publish(Event::Connected);
                if self.options.resubscribe {
                    for sub in st.registry.snapshot() {
                        tracing::debug!(destination = %sub.destination, id = %sub.id, "resubscribing");
                        self.send_locked(st, &sub.to_frame());
                    }
                }
            }
            Command::Message => {
                self.dispatcher
                    .publish(Event::MessageReceived(Message::from_frame(frame)));
            }
            Command::Receipt => match frame.get_header(header::RECEIPT_ID) {
                Some(id) => self.dispatcher.publish(Event::ReceiptReceived {
                    receipt_id: id.to_string(),
                }),
                None => tracing::debug!("RECEIPT without receipt-id ignored"),
            },
            Command::Error => {
                // the transport stays open; only the flag drops
                st.connected = false;
                let err = ServerError::from_frame(frame);
                tracing::warn!(error = %err, "broker sent ERROR");
                self.dispatcher.publish(Event::ErrorReceived(err));
            }
            Command::Heartbeat => self.handle_heartbeat(st),
            other => tracing::debug!(command = %other, "ignoring unexpected frame"),
        }
    }

    /// Answer a heartbeat with the ping token and notify listeners.
    fn handle_heartbeat(&self, st: &ClientState) {
        if let Some(transport) = st.transport.as_ref() {
            let _ = transport.send(PING.to_string());
        }
        self.dispatcher.publish(Event::PingReceived);
    }
}

/// Feed one transport's events into the state machine, in arrival order.
async fn pump(
    shared: Weak<Shared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_transport_event(generation, event).await;
    }
    tracing::trace!(generation, "transport event pump finished");
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
