//! NIP-01: Basic protocol flow description.
//!
//! The event structure shared by every other module, the kind numbers the
//! relay and reference code dispatches on, and tag lookup helpers.
//!
//! Events arrive already signed from relays or the local store; this crate
//! reads them and never signs or verifies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during NIP-01 operations.
#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A signed Nostr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind (integer between 0 and 65535)
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex signature
    pub sig: String,
}

impl Event {
    /// Parse an event from its JSON object form.
    pub fn from_json(json: &str) -> Result<Self, Nip01Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the event to its JSON object form.
    pub fn to_json(&self) -> Result<String, Nip01Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Value of the first tag named `name`, if it carries one.
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tag_values(name).next()
    }

    /// Values (second element) of every tag named `name`, in order.
    pub fn tag_values<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }

    /// Whether at least one tag named `name` exists.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tag_values(name).next().is_some()
    }

    /// Hashtags from `t` tags.
    pub fn hashtags(&self) -> Vec<String> {
        self.tag_values("t").map(str::to_string).collect()
    }
}

// Kinds the relay and reference code dispatches on
pub const KIND_METADATA: u16 = 0;
pub const KIND_SHORT_TEXT_NOTE: u16 = 1;
pub const KIND_CONTACTS: u16 = 3;
pub const KIND_ZAP_REQUEST: u16 = 9734;
pub const KIND_ZAP_RECEIPT: u16 = 9735;
pub const KIND_HIGHLIGHT: u16 = 9802;
pub const KIND_RELAY_LIST_METADATA: u16 = 10002;
pub const KIND_WALLET_REQUEST: u16 = 23194;
pub const KIND_WALLET_RESPONSE: u16 = 23195;
pub const KIND_LONG_FORM_CONTENT: u16 = 30023;

/// Replaceable kinds: 0, 3 and 10000..20000.
pub fn is_replaceable_kind(kind: u16) -> bool {
    kind == KIND_METADATA || kind == KIND_CONTACTS || (10000..20000).contains(&kind)
}

/// Addressable (parameterized replaceable) kinds: 30000..40000.
pub fn is_addressable_kind(kind: u16) -> bool {
    (30000..40000).contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: "a".repeat(64),
            pubkey: "b".repeat(64),
            created_at: 1_700_000_000,
            kind: KIND_SHORT_TEXT_NOTE,
            tags: vec![
                vec!["t".to_string(), "nostr".to_string()],
                vec!["p".to_string(), "c".repeat(64)],
                vec!["t".to_string(), "rust".to_string()],
                vec!["e".to_string()],
            ],
            content: "hello".to_string(),
            sig: "d".repeat(128),
        }
    }

    #[test]
    fn test_tag_lookup() {
        let event = sample_event();
        assert_eq!(event.first_tag_value("p"), Some("c".repeat(64).as_str()));
        assert_eq!(event.hashtags(), vec!["nostr", "rust"]);
        // A tag without a value does not count.
        assert!(!event.has_tag("e"));
        assert!(event.first_tag_value("a").is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let event = sample_event();
        let json = event.to_json().unwrap();
        assert_eq!(Event::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_invalid_json() {
        assert!(Event::from_json("{\"id\": 1}").is_err());
    }

    #[test]
    fn test_kind_classification() {
        assert!(is_replaceable_kind(KIND_RELAY_LIST_METADATA));
        assert!(is_replaceable_kind(KIND_CONTACTS));
        assert!(!is_replaceable_kind(KIND_SHORT_TEXT_NOTE));
        assert!(is_addressable_kind(KIND_LONG_FORM_CONTENT));
        assert!(!is_addressable_kind(KIND_HIGHLIGHT));
    }
}
