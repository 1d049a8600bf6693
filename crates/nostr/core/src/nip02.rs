//! NIP-02: Follow List
//!
//! Kind 3 contact lists. Besides the followed pubkeys (`p` tags), older
//! clients store the user's relays as a JSON object in `.content`:
//!
//! ```json
//! {"wss://relay.damus.io": {"read": true, "write": true}}
//! ```

use crate::nip65::{RelayDescriptor, dedup_relays};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Default, Deserialize)]
struct RelayPermissions {
    #[serde(default)]
    read: bool,
    #[serde(default)]
    write: bool,
}

/// Relays encoded in kind 3 content. Missing flags default to `false`;
/// malformed content yields an empty list.
pub fn relays_from_contacts_content(content: &str) -> Vec<RelayDescriptor> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<BTreeMap<String, RelayPermissions>>(content) {
        Ok(map) => dedup_relays(
            map.into_iter()
                .map(|(url, perms)| RelayDescriptor::new(url, perms.read, perms.write)),
        ),
        Err(e) => {
            warn!("Ignoring malformed contact list relays: {}", e);
            Vec::new()
        }
    }
}

/// Followed pubkeys from `p` tags.
pub fn followings(tags: &[Vec<String>]) -> BTreeSet<String> {
    tag_values(tags, "p").collect()
}

/// Followed hashtags from `t` tags, in order.
pub fn interests(tags: &[Vec<String>]) -> Vec<String> {
    tag_values(tags, "t").collect()
}

fn tag_values<'a>(tags: &'a [Vec<String>], name: &'a str) -> impl Iterator<Item = String> + 'a {
    tags.iter()
        .filter(move |tag| tag.first().map(String::as_str) == Some(name))
        .filter_map(|tag| tag.get(1).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relays_from_contacts_content() {
        let content = r#"{
            "wss://relay.damus.io": {"read": true, "write": true},
            "wss://nos.lol/": {"read": true},
            "wss://relay.primal.net": {}
        }"#;

        let relays = relays_from_contacts_content(content);
        assert_eq!(
            relays,
            vec![
                RelayDescriptor::new("wss://nos.lol", true, false),
                RelayDescriptor::new("wss://relay.damus.io", true, true),
                RelayDescriptor::new("wss://relay.primal.net", false, false),
            ]
        );
    }

    #[test]
    fn test_malformed_content_is_empty() {
        assert!(relays_from_contacts_content("not json").is_empty());
        assert!(relays_from_contacts_content("[1, 2]").is_empty());
        assert!(relays_from_contacts_content("").is_empty());
    }

    #[test]
    fn test_followings_and_interests() {
        let tags = vec![
            vec!["p".to_string(), "aa".to_string()],
            vec!["t".to_string(), "bitcoin".to_string()],
            vec!["p".to_string(), "bb".to_string()],
            vec!["p".to_string(), "aa".to_string()],
            vec!["t".to_string(), "nostr".to_string()],
            vec!["p".to_string()],
        ];

        assert_eq!(
            followings(&tags).into_iter().collect::<Vec<_>>(),
            vec!["aa".to_string(), "bb".to_string()]
        );
        assert_eq!(interests(&tags), vec!["bitcoin", "nostr"]);
    }
}
