use std::collections::HashMap;

use crate::command::{AckMode, Command, header};
use crate::frame::{Frame, Headers};

/// One active destination subscription as recorded by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Subscription id sent in the `id` header.
    pub id: String,
    pub destination: String,
    pub ack: AckMode,
    /// Extra headers passed to `subscribe_with_headers`, replayed on resubscribe.
    pub headers: Headers,
}

impl Subscription {
    /// Build the registry entry for a plain subscribe. The id is the
    /// destination itself, which is empty for an anonymous subscription.
    pub fn new(destination: &str, ack: AckMode) -> Self {
        Self {
            id: destination.to_string(),
            destination: destination.to_string(),
            ack,
            headers: Headers::new(),
        }
    }

    /// Build the registry entry for a subscribe with caller headers. `id` and
    /// `ack` are read back from those headers when present.
    pub fn with_headers(destination: &str, headers: Headers) -> Self {
        let id = headers
            .get(header::ID)
            .cloned()
            .unwrap_or_else(|| destination.to_string());
        let ack = headers
            .get(header::ACK)
            .map(|v| AckMode::from_header(v))
            .unwrap_or_default();
        Self {
            id,
            destination: destination.to_string(),
            ack,
            headers,
        }
    }

    /// The SUBSCRIBE frame for this entry.
    pub fn to_frame(&self) -> Frame {
        if !self.headers.is_empty() {
            // caller headers are sent as given, only the destination is forced
            return Frame::new(Command::Subscribe)
                .headers(self.headers.clone())
                .header(header::DESTINATION, &self.destination);
        }
        Frame::new(Command::Subscribe)
            .header(header::DESTINATION, &self.destination)
            .header(header::ACK, self.ack.as_str())
            .header(header::ID, &self.id)
    }
}

/// Bookkeeping of outbound subscriptions, keyed by subscription id.
///
/// Inbound MESSAGE routing never consults the registry; it only keeps the
/// SUBSCRIBE/UNSUBSCRIBE side consistent and feeds resubscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Re-subscribing with the same id replaces the
    /// previous entry.
    pub fn insert(&mut self, sub: Subscription) -> Option<Subscription> {
        self.entries.insert(sub.id.clone(), sub)
    }

    pub fn remove(&mut self, id: &str) -> Option<Subscription> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries, sorted by id.
    pub fn snapshot(&self) -> Vec<Subscription> {
        let mut v: Vec<Subscription> = self.entries.values().cloned().collect();
        v.sort_by(|a, b| a.id.cmp(&b.id));
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_subscription_uses_destination_as_id() {
        let f = Subscription::new("/x", AckMode::Client).to_frame();
        assert_eq!(f.command, Command::Subscribe);
        assert_eq!(f.get_header("id"), Some("/x"));
        assert_eq!(f.get_header("ack"), Some("client"));
        assert_eq!(f.get_header("destination"), Some("/x"));
    }

    #[test]
    fn anonymous_subscription_keeps_empty_id_header() {
        let f = Subscription::new("", AckMode::Auto).to_frame();
        assert_eq!(f.get_header("id"), Some(""));
        assert_eq!(f.get_header("destination"), Some(""));
    }

    #[test]
    fn header_subscription_forces_destination() {
        let mut h = Headers::new();
        h.insert("destination".into(), "/wrong".into());
        h.insert("id".into(), "sub-7".into());
        h.insert("ack".into(), "client-individual".into());
        let sub = Subscription::with_headers("/right", h);
        assert_eq!(sub.id, "sub-7");
        assert_eq!(sub.ack, AckMode::ClientIndividual);
        let f = sub.to_frame();
        assert_eq!(f.get_header("destination"), Some("/right"));
        assert_eq!(f.get_header("id"), Some("sub-7"));
    }

    #[test]
    fn header_subscription_without_id_is_keyed_by_destination() {
        let sub = Subscription::with_headers("/d", Headers::new());
        assert_eq!(sub.id, "/d");
        assert_eq!(sub.ack, AckMode::Auto);
    }

    #[test]
    fn resubscribe_overwrites() {
        let mut reg = SubscriptionRegistry::new();
        assert!(reg.insert(Subscription::new("/a", AckMode::Auto)).is_none());
        let prev = reg.insert(Subscription::new("/a", AckMode::Client));
        assert_eq!(prev.map(|s| s.ack), Some(AckMode::Auto));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.snapshot()[0].ack, AckMode::Client);
    }

    #[test]
    fn remove_and_snapshot() {
        let mut reg = SubscriptionRegistry::new();
        reg.insert(Subscription::new("/b", AckMode::Auto));
        reg.insert(Subscription::new("/a", AckMode::Auto));
        let ids: Vec<_> = reg.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["/a", "/b"]);
        assert!(reg.remove("/a").is_some());
        assert!(reg.remove("/a").is_none());
        assert!(!reg.is_empty());
    }
}
