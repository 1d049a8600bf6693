//! NIP-21: `nostr:` URI scheme
//!
//! Finds NIP-19 identifiers inside free text, with or without the `nostr:`
//! scheme and with an optional `@` mention marker. A candidate is kept only if
//! it decodes, so words that merely start like a prefix are ignored.
//!
//! ```
//! use nostr_core::nip21::find_all;
//!
//! assert!(find_all("no identifiers in here, just a notebook").is_empty());
//! ```
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/21.md>

use crate::nip19::{self, AddressPointer, Nip19Entity, Nip19Error};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

pub const NOSTR_URI_SCHEME: &str = "nostr:";

/// Prefixes recognised inside text, as they appear before the bech32 data.
pub const IDENTIFIER_PREFIXES: &[&str] = &[
    "nsec1", "npub1", "nevent1", "naddr1", "note1", "nprofile1", "nrelay1",
];

static NOSTR_URI_RE: OnceLock<Regex> = OnceLock::new();
static MENTION_MARKER_RE: OnceLock<Regex> = OnceLock::new();

fn nostr_uri_regex() -> &'static Regex {
    NOSTR_URI_RE.get_or_init(|| {
        Regex::new(
            r"(?i)(nostr:)?@?(nsec1|npub1|nevent1|naddr1|note1|nprofile1|nrelay1)([qpzry9x8gf2tvdw0s3jn54khce6mua7l]+)",
        )
        .expect("nostr uri pattern compiles")
    })
}

fn mention_marker_regex() -> &'static Regex {
    MENTION_MARKER_RE.get_or_init(|| {
        Regex::new(r"(?i)@(nostr:|npub1|note1|nevent1|naddr1|nprofile1)")
            .expect("mention marker pattern compiles")
    })
}

/// Errors for URI conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Nip21Error {
    #[error("missing nostr: scheme in {0}")]
    MissingScheme(String),

    #[error("secret keys must not be shared as nostr: URIs")]
    SecretKey,

    #[error("nip19 error: {0}")]
    Nip19(#[from] Nip19Error),
}

/// One identifier found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NostrUriMatch {
    /// The identifier as written, `nostr:` scheme kept and `@` dropped
    pub uri: String,
    /// The bare bech32 identifier
    pub bech32: String,
    pub entity: Nip19Entity,
    /// Byte offset of the match in the text, including any `@`
    pub start: usize,
    /// Byte offset one past the last bech32 character
    pub end: usize,
}

/// Every decodable identifier in `text`, in order of appearance.
pub fn find_matches(text: &str) -> Vec<NostrUriMatch> {
    nostr_uri_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let scheme = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let bech32 = format!("{}{}", &caps[2], &caps[3]);

            match nip19::decode(&bech32) {
                Ok(entity) => Some(NostrUriMatch {
                    uri: format!("{scheme}{bech32}"),
                    bech32,
                    entity,
                    start: whole.start(),
                    end: whole.end(),
                }),
                Err(e) => {
                    debug!("Skipping undecodable identifier {}: {}", bech32, e);
                    None
                }
            }
        })
        .collect()
}

/// Raw identifier substrings in `text` that decode, in order of appearance.
pub fn find_all(text: &str) -> Vec<String> {
    find_matches(text).into_iter().map(|m| m.uri).collect()
}

/// Drop the `@` placed in front of `nostr:` or a known prefix.
pub fn clean_nostr_uris(text: &str) -> String {
    mention_marker_regex().replace_all(text, "$1").into_owned()
}

/// Strip a leading `@` and `nostr:` scheme.
pub fn strip_nostr_scheme(value: &str) -> &str {
    let value = value.strip_prefix('@').unwrap_or(value);
    if starts_with_ignore_case(value, NOSTR_URI_SCHEME) {
        &value[NOSTR_URI_SCHEME.len()..]
    } else {
        value
    }
}

/// Parse a `nostr:` URI into its entity.
pub fn from_nostr_uri(uri: &str) -> Result<Nip19Entity, Nip21Error> {
    if !starts_with_ignore_case(uri, NOSTR_URI_SCHEME) {
        return Err(Nip21Error::MissingScheme(uri.to_string()));
    }
    Ok(nip19::decode(&uri[NOSTR_URI_SCHEME.len()..])?)
}

/// Build a `nostr:` URI. Secret keys are refused.
pub fn to_nostr_uri(entity: &Nip19Entity) -> Result<String, Nip21Error> {
    if matches!(entity, Nip19Entity::Secret(_)) {
        return Err(Nip21Error::SecretKey);
    }
    Ok(format!("{NOSTR_URI_SCHEME}{}", nip19::encode(entity)?))
}

/// First identifier inside `value`, tolerating a scheme, `@` and trailing text.
pub fn take_as_entity(value: &str) -> Option<Nip19Entity> {
    find_matches(value).into_iter().next().map(|m| m.entity)
}

pub fn take_as_naddr(value: &str) -> Option<AddressPointer> {
    match take_as_entity(value)? {
        Nip19Entity::Address(address) => Some(address),
        _ => None,
    }
}

pub fn take_as_note_hex_id(value: &str) -> Option<String> {
    take_as_entity(value)?.note_hex()
}

pub fn take_as_profile_hex_id(value: &str) -> Option<String> {
    take_as_entity(value)?.profile_hex()
}

/// `nostr:` URI or a bare shareable identifier.
pub fn is_nostr_uri(value: &str) -> bool {
    [NOSTR_URI_SCHEME, "npub1", "note1", "nevent1", "nprofile1", "naddr1"]
        .iter()
        .any(|prefix| starts_with_ignore_case(value, prefix))
}

pub fn is_note(value: &str) -> bool {
    starts_with_ignore_case(value, "note1")
}

pub fn is_npub(value: &str) -> bool {
    starts_with_ignore_case(value, "npub1")
}

pub fn is_nprofile(value: &str) -> bool {
    starts_with_ignore_case(value, "nprofile1")
}

pub fn is_naddr(value: &str) -> bool {
    starts_with_ignore_case(value, "naddr1")
}

pub fn is_nevent(value: &str) -> bool {
    starts_with_ignore_case(value, "nevent1")
}

pub fn is_note_uri(value: &str) -> bool {
    starts_with_ignore_case(value, "nostr:note1")
}

pub fn is_npub_uri(value: &str) -> bool {
    starts_with_ignore_case(value, "nostr:npub1")
}

pub fn is_nprofile_uri(value: &str) -> bool {
    starts_with_ignore_case(value, "nostr:nprofile1")
}

pub fn is_naddr_uri(value: &str) -> bool {
    starts_with_ignore_case(value, "nostr:naddr1")
}

pub fn is_nevent_uri(value: &str) -> bool {
    starts_with_ignore_case(value, "nostr:nevent1")
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nip19::{EventPointer, encode_naddr, encode_nevent, encode_note, encode_npub};
    use proptest::prelude::*;

    fn note() -> String {
        encode_note(&[7u8; 32]).unwrap()
    }

    fn npub() -> String {
        encode_npub(&[9u8; 32]).unwrap()
    }

    #[test]
    fn test_find_prefixed_note_stops_at_alphabet_run() {
        let note = note();
        let text = format!("nostr:{note}... rest of text");
        assert_eq!(find_all(&text), vec![format!("nostr:{note}")]);
    }

    #[test]
    fn test_find_bare_and_mentioned() {
        let note = note();
        let npub = npub();
        let text = format!("gm @{npub}, have you seen {note}?");

        let matches = find_matches(&text);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].uri, npub);
        assert_eq!(matches[0].start, 3);
        assert!(matches!(matches[0].entity, Nip19Entity::Pubkey(_)));
        assert_eq!(matches[1].uri, note);
        assert_eq!(&text[matches[1].start..matches[1].end], note);
    }

    #[test]
    fn test_mention_with_scheme_drops_marker() {
        let npub = npub();
        let text = format!("hi nostr:@{npub}");
        assert_eq!(find_all(&text), vec![format!("nostr:{npub}")]);
    }

    #[test]
    fn test_adjacent_identifiers_both_found() {
        let text = format!("nostr:{},nostr:{}", npub(), note());
        assert_eq!(find_all(&text).len(), 2);
    }

    #[test]
    fn test_undecodable_candidates_dropped() {
        let mut broken = note();
        let last = broken.pop().unwrap();
        broken.push(if last == 'q' { 'p' } else { 'q' });
        let text = format!("note1 notes npub1qqq {broken}");
        assert!(find_all(&text).is_empty());
    }

    #[test]
    fn test_duplicates_kept() {
        let note = note();
        let text = format!("{note} and again nostr:{note}");
        assert_eq!(find_all(&text).len(), 2);
    }

    #[test]
    fn test_case_insensitive_prefix() {
        let upper = npub().to_uppercase();
        let text = format!("NOSTR:{upper}");
        assert_eq!(find_all(&text), vec![text.clone()]);
    }

    #[test]
    fn test_clean_nostr_uris() {
        let npub = npub();
        let text = format!("cc @nostr:{npub} and @{npub} but not @alice");
        assert_eq!(
            clean_nostr_uris(&text),
            format!("cc nostr:{npub} and {npub} but not @alice")
        );
    }

    #[test]
    fn test_predicates() {
        let note = note();
        assert!(is_note(&note));
        assert!(!is_note_uri(&note));
        assert!(is_note_uri(&format!("nostr:{note}")));
        assert!(is_nostr_uri(&note));
        assert!(is_nostr_uri("nostr:anything"));
        assert!(!is_nostr_uri("https://example.com"));
        assert!(is_npub("NPUB1xyz"));
        assert!(is_nprofile("nprofile1abc"));
        assert!(is_naddr_uri("nostr:naddr1abc"));
        assert!(is_nevent("nevent1abc"));
        assert!(!is_npub("np"));
    }

    #[test]
    fn test_take_as_helpers() {
        let event = EventPointer {
            id: [4u8; 32],
            relays: vec!["wss://relay.example.com".to_string()],
            author: None,
            kind: Some(1),
        };
        let nevent = encode_nevent(&event).unwrap();
        assert_eq!(
            take_as_note_hex_id(&format!("@nostr:{nevent}!!")),
            Some("04".repeat(32))
        );
        assert_eq!(take_as_profile_hex_id(&nevent), None);
        assert_eq!(take_as_profile_hex_id(&npub()), Some("09".repeat(32)));

        let address = AddressPointer {
            identifier: "article".to_string(),
            pubkey: [1u8; 32],
            kind: 30023,
            relays: vec![],
        };
        let naddr = encode_naddr(&address).unwrap();
        assert_eq!(take_as_naddr(&format!("nostr:{naddr}")), Some(address));
        assert_eq!(take_as_naddr("plain text"), None);
    }

    #[test]
    fn test_uri_conversion() {
        let entity = Nip19Entity::Note([7u8; 32]);
        let uri = to_nostr_uri(&entity).unwrap();
        assert_eq!(uri, format!("nostr:{}", note()));
        assert_eq!(from_nostr_uri(&uri).unwrap(), entity);
        assert!(matches!(
            from_nostr_uri(&note()),
            Err(Nip21Error::MissingScheme(_))
        ));
        assert_eq!(
            to_nostr_uri(&Nip19Entity::Secret([1u8; 32])),
            Err(Nip21Error::SecretKey)
        );
        assert_eq!(strip_nostr_scheme(&uri), note());
        assert_eq!(strip_nostr_scheme("@npub1x"), "npub1x");
    }

    proptest! {
        #[test]
        fn prop_text_without_prefix_has_no_matches(text in "[a-mo-zA-MO-Z0-9 .,:@#!?\n]{0,200}") {
            prop_assert!(find_all(&text).is_empty());
        }

        #[test]
        fn prop_embedded_identifier_found(
            bytes in prop::array::uniform32(any::<u8>()),
            before in "[a-z ]{0,20}",
            after in "[ .,!?][a-z ]{0,20}",
        ) {
            let note = encode_note(&bytes).expect("encode note");
            let text = format!("{before} nostr:{note}{after}");
            prop_assert_eq!(find_all(&text), vec![format!("nostr:{note}")]);
        }
    }
}
