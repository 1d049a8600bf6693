//! Nostr protocol core for the relay client.
//!
//! This crate provides:
//! - NIP-01: Event type, kind constants and tag helpers
//! - NIP-02: Follow list (followings, interests, relays in kind 3 content)
//! - NIP-19: bech32-encoded entities with TLV payloads
//! - NIP-21: `nostr:` URI scheme and identifier matching in free text
//! - NIP-23: Long-form content metadata and reading time
//! - NIP-27: Text note references
//! - NIP-57: Lightning zap receipts and bolt11 amounts
//! - NIP-65: Relay list metadata and relay descriptors
//! - A reference resolver that hydrates identifiers found in text against
//!   locally known posts, articles, profiles and raw events
//!
//! Everything here is synchronous and free of I/O; networking lives in
//! `nostr-client`.

pub mod nip01;
pub mod nip02;
pub mod nip19;
pub mod nip21;
pub mod nip23;
pub mod nip27;
pub mod nip57;
pub mod nip65;
pub mod resolver;

// NIP-01: Basic protocol
pub use nip01::{
    Event, KIND_CONTACTS, KIND_HIGHLIGHT, KIND_LONG_FORM_CONTENT, KIND_METADATA,
    KIND_RELAY_LIST_METADATA, KIND_SHORT_TEXT_NOTE, KIND_WALLET_REQUEST, KIND_WALLET_RESPONSE,
    KIND_ZAP_RECEIPT, KIND_ZAP_REQUEST, Nip01Error, is_addressable_kind, is_replaceable_kind,
};

// NIP-02: Follow List
pub use nip02::{followings, interests, relays_from_contacts_content};

// NIP-19: bech32-encoded entities
pub use nip19::{
    AddressPointer, EventPointer, MAX_RELAY_HINTS, Nip19Entity, Nip19Error, ProfilePointer, Tlv,
    decode, ellipsize_npub, encode, encode_naddr, encode_nevent, encode_note, encode_nprofile,
    encode_npub, encode_nsec,
};

// NIP-21: nostr: URI scheme
pub use nip21::{
    NOSTR_URI_SCHEME, Nip21Error, NostrUriMatch, clean_nostr_uris, find_all, find_matches,
    from_nostr_uri, is_nostr_uri, strip_nostr_scheme, to_nostr_uri,
};

// NIP-23: Long-form Content
pub use nip23::{ArticleMetadata, WORDS_PER_MINUTE, reading_time_minutes};

// NIP-27: Text Note References
pub use nip27::{
    MentionReference, extract_event_references, extract_profile_references, extract_references,
    get_mentioned_event_ids, get_mentioned_pubkeys, has_references, replace_references,
};

// NIP-57: Lightning Zaps
pub use nip57::{Nip57Error, ZapReceipt, ZapRequest, bolt11_amount_msats, msats_to_sats};

// NIP-65: Relay List Metadata
pub use nip65::{
    Nip65Error, RelayDescriptor, RelayMarker, dedup_relays, normalize_relay_url, relay_set,
    relays_from_event, relays_from_tags,
};

// Reference resolution
pub use resolver::{NostrReference, Reference, ReferenceType, ResolverContext, SourceText};
