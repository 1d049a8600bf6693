//! Subscription ids and bookkeeping for pool-wide queries.

use nostr_core::Event;
use std::collections::HashSet;
use uuid::Uuid;

/// Short random subscription id.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Tracks one subscription across several relays.
///
/// A relay is finished once it sent EOSE or CLOSED, or dropped out. Events
/// are deduplicated by id across relays.
#[derive(Debug, Clone)]
pub struct SubscriptionTracker {
    pub id: String,
    relays: HashSet<String>,
    finished: HashSet<String>,
    seen: HashSet<String>,
    events: Vec<Event>,
}

impl SubscriptionTracker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            relays: HashSet::new(),
            finished: HashSet::new(),
            seen: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn add_relay(&mut self, relay_url: impl Into<String>) {
        self.relays.insert(relay_url.into());
    }

    /// A relay that went away counts as finished.
    pub fn remove_relay(&mut self, relay_url: &str) {
        self.relays.remove(relay_url);
        self.finished.remove(relay_url);
    }

    /// EOSE or CLOSED from `relay_url`. Relays not tracked are ignored.
    pub fn mark_finished(&mut self, relay_url: &str) {
        if self.relays.contains(relay_url) {
            self.finished.insert(relay_url.to_string());
        }
    }

    /// Every tracked relay finished. Vacuously true with no relays.
    pub fn all_finished(&self) -> bool {
        self.relays.len() == self.finished.len()
    }

    /// Record an event; returns false when the id was already seen.
    pub fn add_event(&mut self, event: Event) -> bool {
        if !self.seen.insert(event.id.clone()) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Collected events in arrival order.
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            pubkey: "pk".to_string(),
            created_at: 0,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn test_generate_subscription_id() {
        let id1 = generate_subscription_id();
        let id2 = generate_subscription_id();

        assert_eq!(id1.len(), 8);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_tracker_finishes_when_all_relays_done() {
        let mut tracker = SubscriptionTracker::new("sub1");
        tracker.add_relay("wss://relay1.com");
        tracker.add_relay("wss://relay2.com");
        assert!(!tracker.all_finished());

        tracker.mark_finished("wss://relay1.com");
        tracker.mark_finished("wss://unknown.com");
        assert!(!tracker.all_finished());

        tracker.mark_finished("wss://relay2.com");
        assert!(tracker.all_finished());
    }

    #[test]
    fn test_tracker_remove_relay() {
        let mut tracker = SubscriptionTracker::new("sub1");
        tracker.add_relay("wss://relay1.com");
        tracker.add_relay("wss://relay2.com");
        tracker.mark_finished("wss://relay1.com");

        assert!(!tracker.all_finished());

        tracker.remove_relay("wss://relay2.com");
        assert!(tracker.all_finished());

        // a late EOSE from the removed relay changes nothing
        tracker.mark_finished("wss://relay2.com");
        assert!(tracker.all_finished());
    }

    #[test]
    fn test_tracker_deduplicates_events() {
        let mut tracker = SubscriptionTracker::new("sub1");
        assert!(tracker.add_event(event("a")));
        assert!(tracker.add_event(event("b")));
        assert!(!tracker.add_event(event("a")));

        let ids: Vec<String> = tracker.into_events().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
