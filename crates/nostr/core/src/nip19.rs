//! NIP-19: bech32-encoded entities
//!
//! Human-readable encodings for keys, notes and pointers. Bare entities
//! (`npub`, `nsec`, `note`) carry a 32-byte payload directly. Shareable
//! entities (`nprofile`, `nevent`, `naddr`, `nrelay`) carry a TLV payload:
//! a sequence of `(type: u8, length: u8, value)` records.
//!
//! TLV payloads are first parsed into a [`Tlv`] map from type byte to the
//! list of values seen for it, so record types this crate does not know
//! about are carried past without failing the decode.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/19.md>

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use std::collections::BTreeMap;
use thiserror::Error;

pub const NPUB_HRP: &str = "npub";
pub const NSEC_HRP: &str = "nsec";
pub const NOTE_HRP: &str = "note";
pub const NPROFILE_HRP: &str = "nprofile";
pub const NEVENT_HRP: &str = "nevent";
pub const NADDR_HRP: &str = "naddr";
pub const NRELAY_HRP: &str = "nrelay";

/// TLV type: pubkey, event id, `d` identifier or relay url depending on the entity
pub const TLV_SPECIAL: u8 = 0;
/// TLV type: relay hint (ascii url)
pub const TLV_RELAY: u8 = 1;
/// TLV type: 32-byte author pubkey
pub const TLV_AUTHOR: u8 = 2;
/// TLV type: 4-byte big-endian event kind
pub const TLV_KIND: u8 = 3;

/// Relay hints kept per entity. Extra hints are dropped on decode and
/// rejected on encode.
pub const MAX_RELAY_HINTS: usize = 5;

/// TLV payload: type byte to the values recorded under it, in order.
pub type Tlv = BTreeMap<u8, Vec<Vec<u8>>>;

/// Errors raised while encoding or decoding NIP-19 entities.
///
/// Every decode failure (charset, checksum, prefix, TLV framing) surfaces as
/// this one type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Nip19Error {
    #[error("bech32 decoding error: {0}")]
    Bech32Decode(String),

    #[error("bech32 encoding error: {0}")]
    Bech32Encode(String),

    #[error("unknown prefix: {0}")]
    UnknownPrefix(String),

    #[error("truncated TLV record at offset {0}")]
    TruncatedTlv(usize),

    #[error("missing TLV field: {0}")]
    MissingField(&'static str),

    #[error("invalid length for {field}: expected {expected} bytes, got {got}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("too many relay hints: {count} (max {max})")]
    TooManyRelays { count: usize, max: usize },

    #[error("TLV value too long: {0} bytes")]
    ValueTooLong(usize),
}

/// `nprofile`: a pubkey plus relays where the profile can be found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfilePointer {
    pub pubkey: [u8; 32],
    pub relays: Vec<String>,
}

/// `nevent`: an event id with optional relays, author and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventPointer {
    pub id: [u8; 32],
    pub relays: Vec<String>,
    pub author: Option<[u8; 32]>,
    pub kind: Option<u32>,
}

/// `naddr`: coordinates of an addressable event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressPointer {
    /// The `d` tag value (may be empty)
    pub identifier: String,
    pub pubkey: [u8; 32],
    pub kind: u32,
    pub relays: Vec<String>,
}

impl AddressPointer {
    /// The `a` tag coordinate: `<kind>:<pubkey hex>:<identifier>`.
    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.kind, hex::encode(self.pubkey), self.identifier)
    }
}

/// A decoded NIP-19 entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Nip19Entity {
    /// `npub`
    Pubkey([u8; 32]),
    /// `nsec`
    Secret([u8; 32]),
    /// `note`
    Note([u8; 32]),
    /// `nprofile`
    Profile(ProfilePointer),
    /// `nevent`
    Event(EventPointer),
    /// `naddr`
    Address(AddressPointer),
    /// `nrelay`
    Relay(String),
}

impl Nip19Entity {
    /// The bech32 human-readable prefix for this entity.
    pub fn prefix(&self) -> &'static str {
        match self {
            Nip19Entity::Pubkey(_) => NPUB_HRP,
            Nip19Entity::Secret(_) => NSEC_HRP,
            Nip19Entity::Note(_) => NOTE_HRP,
            Nip19Entity::Profile(_) => NPROFILE_HRP,
            Nip19Entity::Event(_) => NEVENT_HRP,
            Nip19Entity::Address(_) => NADDR_HRP,
            Nip19Entity::Relay(_) => NRELAY_HRP,
        }
    }

    /// Hex pubkey for `npub` and `nprofile`.
    pub fn profile_hex(&self) -> Option<String> {
        match self {
            Nip19Entity::Pubkey(pubkey) => Some(hex::encode(pubkey)),
            Nip19Entity::Profile(profile) => Some(hex::encode(profile.pubkey)),
            _ => None,
        }
    }

    /// Hex event id for `note` and `nevent`.
    pub fn note_hex(&self) -> Option<String> {
        match self {
            Nip19Entity::Note(id) => Some(hex::encode(id)),
            Nip19Entity::Event(event) => Some(hex::encode(event.id)),
            _ => None,
        }
    }

    /// Hex id used to look the entity up as a raw event.
    pub fn event_hex(&self) -> Option<String> {
        self.note_hex()
    }

    /// Relay hints carried by the entity.
    pub fn relays(&self) -> &[String] {
        match self {
            Nip19Entity::Profile(profile) => &profile.relays,
            Nip19Entity::Event(event) => &event.relays,
            Nip19Entity::Address(address) => &address.relays,
            _ => &[],
        }
    }
}

/// Decode any supported NIP-19 string.
///
/// Only the original bech32 checksum is accepted; a bech32m string is a
/// checksum error.
pub fn decode(encoded: &str) -> Result<Nip19Entity, Nip19Error> {
    let checked = CheckedHrpstring::new::<Bech32>(encoded)
        .map_err(|e| Nip19Error::Bech32Decode(e.to_string()))?;
    let prefix = checked.hrp().to_lowercase();
    let data: Vec<u8> = checked.byte_iter().collect();

    match prefix.as_str() {
        NPUB_HRP => Ok(Nip19Entity::Pubkey(to_array(&data, "pubkey")?)),
        NSEC_HRP => Ok(Nip19Entity::Secret(to_array(&data, "secret key")?)),
        NOTE_HRP => Ok(Nip19Entity::Note(to_array(&data, "event id")?)),
        NPROFILE_HRP => {
            let tlv = parse_tlv(&data)?;
            Ok(Nip19Entity::Profile(ProfilePointer {
                pubkey: to_array(required(&tlv, TLV_SPECIAL, "pubkey")?, "pubkey")?,
                relays: relay_hints(&tlv)?,
            }))
        }
        NEVENT_HRP => {
            let tlv = parse_tlv(&data)?;
            Ok(Nip19Entity::Event(EventPointer {
                id: to_array(required(&tlv, TLV_SPECIAL, "event id")?, "event id")?,
                relays: relay_hints(&tlv)?,
                author: first(&tlv, TLV_AUTHOR)
                    .map(|v| to_array(v, "author"))
                    .transpose()?,
                kind: first(&tlv, TLV_KIND).map(to_kind).transpose()?,
            }))
        }
        NADDR_HRP => {
            let tlv = parse_tlv(&data)?;
            let identifier = required(&tlv, TLV_SPECIAL, "identifier")?;
            Ok(Nip19Entity::Address(AddressPointer {
                identifier: to_utf8(identifier, "identifier")?,
                pubkey: to_array(required(&tlv, TLV_AUTHOR, "author")?, "author")?,
                kind: to_kind(required(&tlv, TLV_KIND, "kind")?)?,
                relays: relay_hints(&tlv)?,
            }))
        }
        NRELAY_HRP => {
            let tlv = parse_tlv(&data)?;
            let url = required(&tlv, TLV_SPECIAL, "relay url")?;
            Ok(Nip19Entity::Relay(to_utf8(url, "relay url")?))
        }
        _ => Err(Nip19Error::UnknownPrefix(prefix)),
    }
}

/// Encode an entity to its bech32 string.
pub fn encode(entity: &Nip19Entity) -> Result<String, Nip19Error> {
    let data = match entity {
        Nip19Entity::Pubkey(bytes) | Nip19Entity::Secret(bytes) | Nip19Entity::Note(bytes) => {
            bytes.to_vec()
        }
        Nip19Entity::Profile(profile) => {
            let mut tlv = Tlv::new();
            tlv.insert(TLV_SPECIAL, vec![profile.pubkey.to_vec()]);
            insert_relays(&mut tlv, &profile.relays)?;
            write_tlv(&tlv)?
        }
        Nip19Entity::Event(event) => {
            let mut tlv = Tlv::new();
            tlv.insert(TLV_SPECIAL, vec![event.id.to_vec()]);
            insert_relays(&mut tlv, &event.relays)?;
            if let Some(author) = event.author {
                tlv.insert(TLV_AUTHOR, vec![author.to_vec()]);
            }
            if let Some(kind) = event.kind {
                tlv.insert(TLV_KIND, vec![kind.to_be_bytes().to_vec()]);
            }
            write_tlv(&tlv)?
        }
        Nip19Entity::Address(address) => {
            let mut tlv = Tlv::new();
            tlv.insert(TLV_SPECIAL, vec![address.identifier.as_bytes().to_vec()]);
            insert_relays(&mut tlv, &address.relays)?;
            tlv.insert(TLV_AUTHOR, vec![address.pubkey.to_vec()]);
            tlv.insert(TLV_KIND, vec![address.kind.to_be_bytes().to_vec()]);
            write_tlv(&tlv)?
        }
        Nip19Entity::Relay(url) => {
            let mut tlv = Tlv::new();
            tlv.insert(TLV_SPECIAL, vec![url.as_bytes().to_vec()]);
            write_tlv(&tlv)?
        }
    };

    encode_bech32(entity.prefix(), &data)
}

/// Encode a 32-byte public key as `npub`.
pub fn encode_npub(pubkey: &[u8; 32]) -> Result<String, Nip19Error> {
    encode(&Nip19Entity::Pubkey(*pubkey))
}

/// Encode a 32-byte secret key as `nsec`.
pub fn encode_nsec(secret: &[u8; 32]) -> Result<String, Nip19Error> {
    encode(&Nip19Entity::Secret(*secret))
}

/// Encode a 32-byte event id as `note`.
pub fn encode_note(id: &[u8; 32]) -> Result<String, Nip19Error> {
    encode(&Nip19Entity::Note(*id))
}

pub fn encode_nprofile(profile: &ProfilePointer) -> Result<String, Nip19Error> {
    encode(&Nip19Entity::Profile(profile.clone()))
}

pub fn encode_nevent(event: &EventPointer) -> Result<String, Nip19Error> {
    encode(&Nip19Entity::Event(event.clone()))
}

pub fn encode_naddr(address: &AddressPointer) -> Result<String, Nip19Error> {
    encode(&Nip19Entity::Address(address.clone()))
}

/// Encode a hex pubkey as `npub`.
pub fn npub_from_hex(pubkey_hex: &str) -> Result<String, Nip19Error> {
    encode_npub(&hex_to_array(pubkey_hex)?)
}

/// Encode a hex event id as `note`.
pub fn note_from_hex(id_hex: &str) -> Result<String, Nip19Error> {
    encode_note(&hex_to_array(id_hex)?)
}

/// Short display form of a pubkey: `npub1abcdefg...uvwxyz`.
///
/// Falls back to the input when it is not a valid 32-byte hex key.
pub fn ellipsize_npub(pubkey_hex: &str) -> String {
    match npub_from_hex(pubkey_hex) {
        Ok(npub) => format!("{}...{}", &npub[..12], &npub[npub.len() - 6..]),
        Err(_) => pubkey_hex.to_string(),
    }
}

/// Parse a TLV payload. Unknown types are kept, not rejected.
pub fn parse_tlv(data: &[u8]) -> Result<Tlv, Nip19Error> {
    let mut tlv = Tlv::new();
    let mut offset = 0;

    while offset < data.len() {
        if offset + 2 > data.len() {
            return Err(Nip19Error::TruncatedTlv(offset));
        }
        let kind = data[offset];
        let len = data[offset + 1] as usize;
        let start = offset + 2;
        let end = start + len;
        if end > data.len() {
            return Err(Nip19Error::TruncatedTlv(offset));
        }
        tlv.entry(kind).or_default().push(data[start..end].to_vec());
        offset = end;
    }

    Ok(tlv)
}

/// Serialize a TLV map, types ascending and values in insertion order.
pub fn write_tlv(tlv: &Tlv) -> Result<Vec<u8>, Nip19Error> {
    let mut out = Vec::new();
    for (kind, values) in tlv {
        for value in values {
            let len = u8::try_from(value.len()).map_err(|_| Nip19Error::ValueTooLong(value.len()))?;
            out.push(*kind);
            out.push(len);
            out.extend_from_slice(value);
        }
    }
    Ok(out)
}

fn encode_bech32(prefix: &str, data: &[u8]) -> Result<String, Nip19Error> {
    let hrp = Hrp::parse(prefix).map_err(|e| Nip19Error::Bech32Encode(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Nip19Error::Bech32Encode(e.to_string()))
}

fn insert_relays(tlv: &mut Tlv, relays: &[String]) -> Result<(), Nip19Error> {
    if relays.len() > MAX_RELAY_HINTS {
        return Err(Nip19Error::TooManyRelays {
            count: relays.len(),
            max: MAX_RELAY_HINTS,
        });
    }
    if !relays.is_empty() {
        tlv.insert(
            TLV_RELAY,
            relays.iter().map(|r| r.as_bytes().to_vec()).collect(),
        );
    }
    Ok(())
}

fn relay_hints(tlv: &Tlv) -> Result<Vec<String>, Nip19Error> {
    tlv.get(&TLV_RELAY)
        .map(|values| {
            values
                .iter()
                .take(MAX_RELAY_HINTS)
                .map(|v| to_utf8(v, "relay"))
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn first(tlv: &Tlv, kind: u8) -> Option<&[u8]> {
    tlv.get(&kind).and_then(|values| values.first()).map(Vec::as_slice)
}

fn required<'a>(tlv: &'a Tlv, kind: u8, field: &'static str) -> Result<&'a [u8], Nip19Error> {
    first(tlv, kind).ok_or(Nip19Error::MissingField(field))
}

fn to_array(bytes: &[u8], field: &'static str) -> Result<[u8; 32], Nip19Error> {
    bytes.try_into().map_err(|_| Nip19Error::InvalidLength {
        field,
        expected: 32,
        got: bytes.len(),
    })
}

fn to_kind(bytes: &[u8]) -> Result<u32, Nip19Error> {
    let raw: [u8; 4] = bytes.try_into().map_err(|_| Nip19Error::InvalidLength {
        field: "kind",
        expected: 4,
        got: bytes.len(),
    })?;
    Ok(u32::from_be_bytes(raw))
}

fn to_utf8(bytes: &[u8], field: &'static str) -> Result<String, Nip19Error> {
    String::from_utf8(bytes.to_vec()).map_err(|_| Nip19Error::InvalidUtf8(field))
}

fn hex_to_array(value: &str) -> Result<[u8; 32], Nip19Error> {
    let bytes = hex::decode(value).map_err(|e| Nip19Error::InvalidHex(e.to_string()))?;
    to_array(&bytes, "hex key")
}
