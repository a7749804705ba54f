use std::fmt;

/// Value forced into the `accept-version` header of every CONNECT frame.
pub const ACCEPT_VERSION: &str = "1.1,1.2";

/// The ping token written back to the broker when a heartbeat arrives.
pub const PING: &str = "\n";

/// Header keys used by the client and the broker.
pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ACK: &str = "ack";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    /// Epoch-seconds marker carried by DISCONNECT.
    pub const DISCONNECTED: &str = "disconnected";
    pub const ID: &str = "id";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SESSION: &str = "session";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const TRANSACTION: &str = "transaction";
}

/// Content types set on SEND frames.
pub mod content_type {
    pub const TEXT: &str = "text/plain";
    pub const JSON: &str = "application/json;charset=UTF-8";
}

/// The closed set of STOMP commands understood by the client.
///
/// `Heartbeat` stands for a frame whose command line is empty (a bare LF on
/// the wire). Tokens outside the vocabulary decode to `Unknown` instead of
/// failing, and are ignored by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Begin,
    Commit,
    Abort,
    Ack,
    Disconnect,
    Connected,
    Message,
    Receipt,
    Error,
    Heartbeat,
    Unknown,
}

impl Command {
    /// Map a command line to a `Command`. Never fails.
    pub fn from_token(token: &str) -> Self {
        match token {
            "" => Command::Heartbeat,
            "CONNECT" => Command::Connect,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "ACK" => Command::Ack,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => Command::Unknown,
        }
    }

    /// Wire token for this command. `Heartbeat` and `Unknown` have none.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Ack => "ACK",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Heartbeat | Command::Unknown => "",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Heartbeat => f.write_str("<heartbeat>"),
            Command::Unknown => f.write_str("<unknown>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Subscription acknowledgement modes as defined by STOMP 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AckMode {
    #[default]
    Auto,
    Client,
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }

    /// Parse an `ack` header value. Anything unrecognised is treated as `auto`,
    /// which is also what brokers assume when the header is missing.
    pub fn from_header(value: &str) -> Self {
        match value {
            "client" => AckMode::Client,
            "client-individual" => AckMode::ClientIndividual,
            _ => AckMode::Auto,
        }
    }
}
