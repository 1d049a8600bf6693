//! NIP-65: Relay List Metadata
//!
//! Defines a replaceable event (kind 10002) to advertise relays where the user
//! writes to and relays where the user reads mentions from.
//!
//! [`RelayDescriptor`] is the relay-set element used throughout the client:
//! relay lists coming from kind 10002 tags or from kind 3 content both end up
//! as a deduplicated `Vec<RelayDescriptor>`.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/65.md>

use crate::nip01::{Event, KIND_RELAY_LIST_METADATA};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Tag name for relay entries
pub const RELAY_TAG: &str = "r";

/// Marker for read-only relays
pub const READ_MARKER: &str = "read";

/// Marker for write-only relays
pub const WRITE_MARKER: &str = "write";

/// Errors that can occur during NIP-65 operations
#[derive(Debug, Error)]
pub enum Nip65Error {
    #[error("event is not a relay list metadata event (kind {0})")]
    InvalidKind(u16),
}

/// Relay marker indicating usage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMarker {
    Read,
    Write,
    /// No marker: both directions
    ReadWrite,
    /// A marker this client does not understand
    Unknown,
}

impl RelayMarker {
    /// Parse the optional third element of an `r` tag, ignoring case.
    pub fn parse(marker: Option<&str>) -> Self {
        match marker.map(str::to_ascii_lowercase).as_deref() {
            None => RelayMarker::ReadWrite,
            Some(READ_MARKER) => RelayMarker::Read,
            Some(WRITE_MARKER) => RelayMarker::Write,
            Some(_) => RelayMarker::Unknown,
        }
    }

    pub fn can_read(&self) -> bool {
        matches!(self, RelayMarker::Read | RelayMarker::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, RelayMarker::Write | RelayMarker::ReadWrite)
    }
}

/// A relay and the directions it is used for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelayDescriptor {
    pub url: String,
    pub read: bool,
    pub write: bool,
}

impl RelayDescriptor {
    pub fn new(url: impl Into<String>, read: bool, write: bool) -> Self {
        Self {
            url: normalize_relay_url(&url.into()),
            read,
            write,
        }
    }

    /// A relay used for both reading and writing.
    pub fn read_write(url: impl Into<String>) -> Self {
        Self::new(url, true, true)
    }

    fn from_marker(url: &str, marker: RelayMarker) -> Self {
        Self::new(url, marker.can_read(), marker.can_write())
    }

    /// The `r` tag advertising this relay.
    pub fn to_tag(&self) -> Vec<String> {
        let mut tag = vec![RELAY_TAG.to_string(), self.url.clone()];
        match (self.read, self.write) {
            (true, false) => tag.push(READ_MARKER.to_string()),
            (false, true) => tag.push(WRITE_MARKER.to_string()),
            _ => {}
        }
        tag
    }
}

/// Trim whitespace and a trailing `/` so equal relays compare equal.
pub fn normalize_relay_url(url: &str) -> String {
    let trimmed = url.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

/// Keep the first descriptor per url, preserving order.
pub fn dedup_relays(relays: impl IntoIterator<Item = RelayDescriptor>) -> Vec<RelayDescriptor> {
    let mut seen = HashSet::new();
    relays
        .into_iter()
        .filter(|relay| seen.insert(relay.url.clone()))
        .collect()
}

/// Order-independent view of a relay list, for content equality checks.
pub fn relay_set(relays: &[RelayDescriptor]) -> BTreeSet<RelayDescriptor> {
    relays.iter().cloned().collect()
}

/// Relays from a kind 10002 tag list.
pub fn relays_from_tags(tags: &[Vec<String>]) -> Vec<RelayDescriptor> {
    dedup_relays(tags.iter().filter_map(|tag| {
        if tag.first().map(String::as_str) != Some(RELAY_TAG) {
            return None;
        }
        let url = tag.get(1)?;
        let marker = RelayMarker::parse(tag.get(2).map(String::as_str));
        Some(RelayDescriptor::from_marker(url, marker))
    }))
}

/// Relays from a kind 10002 event.
pub fn relays_from_event(event: &Event) -> Result<Vec<RelayDescriptor>, Nip65Error> {
    if event.kind != KIND_RELAY_LIST_METADATA {
        return Err(Nip65Error::InvalidKind(event.kind));
    }
    Ok(relays_from_tags(&event.tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_markers() {
        assert_eq!(RelayMarker::parse(None), RelayMarker::ReadWrite);
        assert_eq!(RelayMarker::parse(Some("READ")), RelayMarker::Read);
        assert_eq!(RelayMarker::parse(Some("write")), RelayMarker::Write);
        assert_eq!(RelayMarker::parse(Some("both")), RelayMarker::Unknown);
        assert!(!RelayMarker::Unknown.can_read());
        assert!(!RelayMarker::Unknown.can_write());
    }

    #[test]
    fn test_relays_from_tags() {
        let tags = vec![
            tag(&["r", "wss://alicerelay.example.com"]),
            tag(&["r", "wss://brando-relay.com", "Write"]),
            tag(&["r", "wss://expensive-relay.example2.com", "read"]),
            tag(&["r", "wss://odd.example.com", "sometimes"]),
            tag(&["p", "wss://not-a-relay.com"]),
            tag(&["r"]),
        ];

        let relays = relays_from_tags(&tags);
        assert_eq!(
            relays,
            vec![
                RelayDescriptor::new("wss://alicerelay.example.com", true, true),
                RelayDescriptor::new("wss://brando-relay.com", false, true),
                RelayDescriptor::new("wss://expensive-relay.example2.com", true, false),
                RelayDescriptor::new("wss://odd.example.com", false, false),
            ]
        );
    }

    #[test]
    fn test_duplicate_urls_collapse() {
        let tags = vec![
            tag(&["r", "wss://relay.damus.io/", "read"]),
            tag(&["r", "wss://relay.damus.io"]),
        ];
        let relays = relays_from_tags(&tags);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0], RelayDescriptor::new("wss://relay.damus.io", true, false));
    }

    #[test]
    fn test_relay_set_ignores_order() {
        let a = vec![
            RelayDescriptor::read_write("wss://a.com"),
            RelayDescriptor::read_write("wss://b.com"),
        ];
        let b = vec![
            RelayDescriptor::read_write("wss://b.com"),
            RelayDescriptor::read_write("wss://a.com"),
        ];
        assert_eq!(relay_set(&a), relay_set(&b));

        let c = vec![
            RelayDescriptor::read_write("wss://a.com"),
            RelayDescriptor::new("wss://b.com", true, false),
        ];
        assert_ne!(relay_set(&a), relay_set(&c));
    }

    #[test]
    fn test_to_tag() {
        assert_eq!(
            RelayDescriptor::read_write("wss://a.com").to_tag(),
            tag(&["r", "wss://a.com"])
        );
        assert_eq!(
            RelayDescriptor::new("wss://a.com", true, false).to_tag(),
            tag(&["r", "wss://a.com", "read"])
        );
    }

    #[test]
    fn test_relays_from_event_checks_kind() {
        let event = Event {
            id: "test_id".to_string(),
            pubkey: "test_pubkey".to_string(),
            created_at: 1707409439,
            kind: 1,
            tags: vec![tag(&["r", "wss://a.com"])],
            content: String::new(),
            sig: "test_sig".to_string(),
        };
        assert!(matches!(relays_from_event(&event), Err(Nip65Error::InvalidKind(1))));

        let event = Event {
            kind: KIND_RELAY_LIST_METADATA,
            ..event
        };
        assert_eq!(relays_from_event(&event).unwrap().len(), 1);
    }
}
