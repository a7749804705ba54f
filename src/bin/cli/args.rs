use clap::Parser;

#[derive(Parser)]
#[command(name = "stomp-ws")]
#[command(version)]
#[command(about = "Interactive STOMP over WebSocket client CLI")]
pub struct Cli {
    /// Broker WebSocket URL
    #[arg(short, long, default_value = stomp_ws::connection::DEFAULT_URL)]
    pub url: String,

    /// Extra WebSocket handshake header as key:value (repeatable)
    #[arg(long = "header", value_parser = parse_key_val)]
    pub headers: Vec<(String, String)>,

    /// STOMP CONNECT header as key:value, e.g. login:guest (repeatable)
    #[arg(short = 'c', long = "connect-header", value_parser = parse_key_val)]
    pub connect_headers: Vec<(String, String)>,

    /// Destinations to subscribe to (can be specified multiple times)
    #[arg(short, long)]
    pub subscribe: Vec<String>,

    /// Keep reconnecting (and resubscribing) whenever the connection drops
    #[arg(long)]
    pub reconnect: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Show session summary on exit
    #[arg(long)]
    pub summary: bool,
}

/// Parse a `key:value` pair. Only the first ':' separates.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected key:value, got '{}'", s)),
    }
}
