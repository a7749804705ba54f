use chrono::{DateTime, Local};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maximum number of messages to keep in the ring buffer for reports
pub const MAX_MESSAGES: usize = 1000;

/// Statistics for a single subscription destination
#[derive(Debug, Clone, Default)]
pub struct SubStats {
    /// Number of messages received on this destination
    pub message_count: u64,
    /// False after `unsub`; the printing task stays alive for a later `sub`
    pub active: bool,
}

/// A received message kept for the report
#[derive(Debug, Clone)]
pub struct DisplayMessage {
    pub timestamp: DateTime<Local>,
    pub destination: String,
    pub body: String,
}

/// Session state shared across all CLI tasks
pub struct AppState {
    pub start_time: DateTime<Local>,
    pub url: String,
    pub session_id: Option<String>,

    /// Subscriptions: destination -> stats
    pub subscriptions: HashMap<String, SubStats>,

    pub ping_count: u64,
    pub last_ping: Option<DateTime<Local>>,
    pub connects: u64,
    pub disconnects: u64,
    pub errors: u64,

    /// Messages (ring buffer)
    pub messages: VecDeque<DisplayMessage>,
}

impl AppState {
    pub fn new(url: String) -> Self {
        Self {
            start_time: Local::now(),
            url,
            session_id: None,
            subscriptions: HashMap::new(),
            ping_count: 0,
            last_ping: None,
            connects: 0,
            disconnects: 0,
            errors: 0,
            messages: VecDeque::with_capacity(MAX_MESSAGES),
        }
    }

    pub fn record_ping(&mut self) {
        self.ping_count += 1;
        self.last_ping = Some(Local::now());
    }

    pub fn record_connected(&mut self, session_id: Option<String>) {
        self.connects += 1;
        self.session_id = session_id;
    }

    pub fn record_disconnected(&mut self) {
        self.disconnects += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Record a received message
    pub fn record_message(&mut self, destination: &str, body: String) {
        let stats = self.subscriptions.entry(destination.to_string()).or_default();
        stats.message_count += 1;

        self.messages.push_back(DisplayMessage {
            timestamp: Local::now(),
            destination: destination.to_string(),
            body,
        });
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
    }

    /// Mark a destination subscribed. Returns true the first time the
    /// destination is seen, i.e. when a printing task must be spawned.
    pub fn register_subscription(&mut self, destination: &str) -> bool {
        let is_new = !self.subscriptions.contains_key(destination);
        self.subscriptions.entry(destination.to_string()).or_default().active = true;
        is_new
    }

    pub fn unregister_subscription(&mut self, destination: &str) {
        if let Some(stats) = self.subscriptions.get_mut(destination) {
            stats.active = false;
        }
    }

    pub fn total_message_count(&self) -> u64 {
        self.subscriptions.values().map(|s| s.message_count).sum()
    }

    /// Session duration as hh:mm:ss
    pub fn session_duration(&self) -> String {
        let total_secs = Local::now().signed_duration_since(self.start_time).num_seconds();
        format!(
            "{:02}:{:02}:{:02}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60
        )
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// One-line connection status
    pub fn status_line(&self, connected: bool, state: stomp_ws::ConnectionState) -> String {
        let active = self.subscriptions.values().filter(|s| s.active).count();
        let last_ping = self
            .last_ping
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "{} state={:?} connected={} session={} subscriptions={} messages={} pings={} (last {}) up {}",
            self.url,
            state,
            connected,
            self.session_id.as_deref().unwrap_or("-"),
            active,
            self.total_message_count(),
            self.ping_count,
            last_ping,
            self.session_duration()
        )
    }

    pub fn generate_summary(&self) -> String {
        self.generate_summary_with_options(false, 80)
    }

    /// Session report with optional message history
    pub fn generate_summary_with_options(&self, include_messages: bool, max_width: usize) -> String {
        let end_time = Local::now();
        let total_secs = end_time.signed_duration_since(self.start_time).num_seconds();

        let rule = "═".repeat(79);
        let mut lines = vec![
            rule.clone(),
            "  stomp-ws Session Report".to_string(),
            rule.clone(),
            format!("  URL:        {}", self.url),
            format!("  Session:    {}", self.session_id.as_deref().unwrap_or("-")),
            format!("  Started:    {}", self.start_time.format("%Y-%m-%d %H:%M:%S")),
            format!("  Ended:      {}", end_time.format("%Y-%m-%d %H:%M:%S")),
            format!("  Duration:   {}m {}s", total_secs / 60, total_secs % 60),
            format!(
                "  Connects:   {}  Disconnects: {}  Errors: {}",
                self.connects, self.disconnects, self.errors
            ),
            String::new(),
            "  Subscriptions:".to_string(),
        ];

        // busiest destinations first
        let mut subs: Vec<_> = self.subscriptions.iter().collect();
        subs.sort_by(|a, b| b.1.message_count.cmp(&a.1.message_count).then(a.0.cmp(b.0)));

        let width = subs.iter().map(|(d, _)| d.len()).max().unwrap_or(20).min(40);
        for (dest, stats) in &subs {
            lines.push(format!(
                "    {:width$} {:>6}",
                truncate_str(dest, width),
                stats.message_count,
                width = width
            ));
        }
        lines.push(format!("    {:─>w$}", "", w = width + 7));
        lines.push(format!("    {:width$} {:>6}", "Total", self.total_message_count(), width = width));
        lines.push(String::new());
        lines.push(format!("  Pings received: {}", self.ping_count));

        if include_messages && !self.messages.is_empty() {
            let thin = "─".repeat(79);
            lines.push(String::new());
            lines.push(thin.clone());
            lines.push("  Message History".to_string());
            lines.push(thin);
            for msg in &self.messages {
                let prefix = format!("  {} [{}] ", msg.timestamp.format("%H:%M:%S"), msg.destination);
                let body_width = max_width.saturating_sub(prefix.chars().count());
                lines.push(format!("{}{}", prefix, truncate_str(&msg.body, body_width)));
            }
        }

        lines.push(rule);
        lines.join("\n")
    }
}

/// Truncate to `max_len` characters, adding "..." when cut
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        ".".repeat(max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

/// Thread-safe shared state
pub type SharedState = Arc<Mutex<AppState>>;

pub fn new_shared_state(url: String) -> SharedState {
    Arc::new(Mutex::new(AppState::new(url)))
}
