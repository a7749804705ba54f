//! Text codec for STOMP frames carried one per WebSocket message.
//!
//! Each WebSocket text message holds exactly one frame, so there is no
//! buffering or reassembly here: `decode` takes a whole message and `encode`
//! produces a whole message.

use crate::command::{Command, PING};
use crate::frame::{Frame, Headers};

/// Decode one inbound WebSocket text payload into a `Frame`.
///
/// Returns `None` when the payload contains no command line at all (for
/// example the empty string). Malformed input never fails: header lines
/// without a `:` become a header with an empty value, an unknown command
/// becomes `Command::Unknown`, and an empty command line is a heartbeat.
pub fn decode(text: &str) -> Option<Frame> {
    let mut lines = text.split('\n').peekable();

    // tolerate one stray delimiter in front of the command
    if lines.peek() == Some(&"") {
        lines.next();
    }

    let command = Command::from_token(strip_cr(lines.next()?));

    let mut headers = Headers::new();
    let mut saw_blank = false;
    for line in lines.by_ref() {
        let line = strip_cr(line);
        if line.is_empty() {
            saw_blank = true;
            break;
        }
        // only the first ':' separates; values may contain more
        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        headers.insert(key.to_string(), value.to_string());
    }

    let body = if saw_blank {
        let joined = lines.collect::<Vec<_>>().join("\n");
        Some(strip_nul(joined)).filter(|b| !b.is_empty())
    } else {
        None
    };

    Some(Frame {
        command,
        headers,
        body,
    })
}

/// Encode a frame into the exact text to send as one WebSocket message.
///
/// Layout: `COMMAND\n`, one `key:value\n` per header, then `\n<body>` or a
/// bare `\n`, then a single NUL. A heartbeat frame encodes to the ping token.
pub fn encode(frame: &Frame) -> String {
    if frame.command == Command::Heartbeat {
        return PING.to_string();
    }

    let body_len = frame.body.as_ref().map_or(0, String::len);
    let mut out = String::with_capacity(32 + body_len);
    out.push_str(frame.command.as_str());
    out.push('\n');
    for (k, v) in &frame.headers {
        out.push_str(k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out.push('\n');
    if let Some(body) = &frame.body {
        out.push_str(body);
    }
    out.push('\0');
    out
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Remove exactly one terminating NUL, along with any EOLs a broker appended
/// after it. Interior NULs are kept.
fn strip_nul(mut body: String) -> String {
    let end = body.trim_end_matches(['\r', '\n']).len();
    if body[..end].ends_with('\0') {
        body.truncate(end - 1);
    }
    body
}
