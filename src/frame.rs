use std::collections::BTreeMap;
use std::fmt;

use crate::command::Command;

/// Header mapping of a frame. Duplicate keys resolve last-write-wins; the
/// ordered map keeps encoding stable for a given set of headers.
pub type Headers = BTreeMap<String, String>;

/// A simple representation of a STOMP frame.
///
/// `Frame` contains the command, the header mapping and an optional text
/// body. Frames are plain values: build one, encode it, drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// STOMP command (e.g. CONNECT, SEND, SUBSCRIBE)
    pub command: Command,
    /// Header name to value
    pub headers: Headers,
    /// Text body, `None` when the frame carries no body
    pub body: Option<String>,
}

impl Frame {
    /// Create a new frame with the given command and empty headers/body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Headers::new(),
            body: None,
        }
    }

    /// Add a header (builder style). An existing value for `key` is replaced.
    ///
    /// Parameters
    /// - `key`: header name (converted to `String`).
    /// - `value`: header value (converted to `String`).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merge a header map into the frame (builder style). Values already
    /// present are overwritten.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the frame body (builder style).
    pub fn set_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Get the value of a header by name (case-sensitive).
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Command: {}", self.command)?;
        for (k, v) in &self.headers {
            writeln!(f, "{}: {}", k, v)?;
        }
        match &self.body {
            Some(body) => writeln!(f, "Body ({} bytes)", body.len()),
            None => writeln!(f, "No body"),
        }
    }
}
