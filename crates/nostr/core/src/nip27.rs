//! NIP-27: Text Note References
//!
//! Inline mentions of profiles and events inside `.content`, located by the
//! NIP-21 matcher. Each reference keeps its byte range so callers can splice
//! rendered mentions back into the text.
//!
//! ```text
//! Check out this profile nostr:nprofile1... and this note @note1...
//! ```

use crate::nip19::Nip19Entity;
use crate::nip21::find_matches;

/// A reference to another entity (profile or event) found in text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionReference {
    /// The decoded NIP-19 entity
    pub entity: Nip19Entity,
    /// The identifier as written (scheme kept, `@` dropped)
    pub uri: String,
    /// The byte position where this reference starts in the content
    pub start: usize,
    /// The byte position where this reference ends in the content
    pub end: usize,
}

/// Extract all decodable references from text content, in order.
///
/// Bare identifiers and `@` mentions count as well as `nostr:` URIs.
/// Invalid identifiers are silently skipped.
pub fn extract_references(content: &str) -> Vec<MentionReference> {
    find_matches(content)
        .into_iter()
        .map(|m| MentionReference {
            entity: m.entity,
            uri: m.uri,
            start: m.start,
            end: m.end,
        })
        .collect()
}

/// Quick check for a `nostr:` marker without decoding anything.
pub fn has_references(content: &str) -> bool {
    content.contains("nostr:")
}

/// Profile references (npub or nprofile).
pub fn extract_profile_references(content: &str) -> Vec<MentionReference> {
    extract_references(content)
        .into_iter()
        .filter(|r| matches!(r.entity, Nip19Entity::Pubkey(_) | Nip19Entity::Profile(_)))
        .collect()
}

/// Event references (note, nevent or naddr).
pub fn extract_event_references(content: &str) -> Vec<MentionReference> {
    extract_references(content)
        .into_iter()
        .filter(|r| {
            matches!(
                r.entity,
                Nip19Entity::Note(_) | Nip19Entity::Event(_) | Nip19Entity::Address(_)
            )
        })
        .collect()
}

/// Hex pubkeys of every mentioned profile.
pub fn get_mentioned_pubkeys(content: &str) -> Vec<String> {
    extract_references(content)
        .iter()
        .filter_map(|r| r.entity.profile_hex())
        .collect()
}

/// Hex ids of every mentioned note or nevent. `naddr` is skipped.
pub fn get_mentioned_event_ids(content: &str) -> Vec<String> {
    extract_references(content)
        .iter()
        .filter_map(|r| r.entity.note_hex())
        .collect()
}

/// Rewrite every reference with `render`; text between references is kept.
pub fn replace_references<F>(content: &str, mut render: F) -> String
where
    F: FnMut(&MentionReference) -> String,
{
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for reference in extract_references(content) {
        out.push_str(&content[cursor..reference.start]);
        out.push_str(&render(&reference));
        cursor = reference.end;
    }
    out.push_str(&content[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nip19::{ProfilePointer, encode_note, encode_nprofile, encode_npub};

    #[test]
    fn test_extract_multiple_references() {
        let npub = encode_npub(&[2u8; 32]).unwrap();
        let note = encode_note(&[3u8; 32]).unwrap();
        let content = format!("Hey nostr:{} check out @{} awesome!", npub, note);

        let refs = extract_references(&content);
        assert_eq!(refs.len(), 2);
        assert!(refs[0].uri.starts_with("nostr:npub"));
        assert_eq!(refs[1].uri, note);
    }

    #[test]
    fn test_has_references() {
        assert!(has_references("Check out nostr:npub1..."));
        assert!(!has_references("No references here"));
        assert!(!has_references(""));
    }

    #[test]
    fn test_profile_and_event_filters() {
        let npub = encode_npub(&[5u8; 32]).unwrap();
        let note = encode_note(&[6u8; 32]).unwrap();
        let content = format!("Profile nostr:{} and note nostr:{}", npub, note);

        let profiles = extract_profile_references(&content);
        assert_eq!(profiles.len(), 1);
        assert!(matches!(profiles[0].entity, Nip19Entity::Pubkey(_)));

        let events = extract_event_references(&content);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].entity, Nip19Entity::Note(_)));
    }

    #[test]
    fn test_get_mentioned_pubkeys() {
        let npub = encode_npub(&[9u8; 32]).unwrap();
        let nprofile = encode_nprofile(&ProfilePointer {
            pubkey: [10u8; 32],
            relays: vec!["wss://relay.example.com".to_string()],
        })
        .unwrap();
        let content = format!("Check nostr:{} and nostr:{}", npub, nprofile);

        assert_eq!(
            get_mentioned_pubkeys(&content),
            vec!["09".repeat(32), "0a".repeat(32)]
        );
        assert!(get_mentioned_event_ids(&content).is_empty());
    }

    #[test]
    fn test_reference_positions() {
        let npub = encode_npub(&[12u8; 32]).unwrap();
        let uri = format!("nostr:{}", npub);
        let content = format!("Start {} end", uri);

        let refs = extract_references(&content);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].start, 6);
        assert_eq!(&content[refs[0].start..refs[0].end], uri);
    }

    #[test]
    fn test_replace_references() {
        let npub = encode_npub(&[13u8; 32]).unwrap();
        let content = format!("ping @{} please", npub);

        let rendered = replace_references(&content, |_| "@alice".to_string());
        assert_eq!(rendered, "ping @alice please");
    }

    #[test]
    fn test_malformed_uri_skipped() {
        let refs = extract_references("Check nostr:invalid_bech32_xxx and continue");
        assert!(refs.is_empty());
    }
}
