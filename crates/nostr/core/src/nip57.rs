//! NIP-57: Lightning Zaps
//!
//! Reading side of zaps:
//! - Zap Request (kind 9734): embedded as JSON in the receipt's `description` tag
//! - Zap Receipt (kind 9735): published by the recipient's wallet once paid
//!
//! The paid amount is taken from the receipt's `bolt11` invoice when it
//! carries one, otherwise from the request's `amount` tag.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/57.md>

use crate::nip01::{Event, KIND_ZAP_RECEIPT, KIND_ZAP_REQUEST};
use thiserror::Error;

pub const MSATS_PER_SAT: u64 = 1_000;
const SATS_PER_BTC: u64 = 100_000_000;
const MSATS_PER_BTC: u64 = SATS_PER_BTC * MSATS_PER_SAT;

/// Errors that can occur during NIP-57 operations
#[derive(Debug, Error)]
pub enum Nip57Error {
    #[error("invalid zap request: {0}")]
    InvalidZapRequest(String),

    #[error("invalid zap receipt: {0}")]
    InvalidZapReceipt(String),

    #[error("missing required tag: {0}")]
    MissingTag(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A zap request (kind 9734)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapRequest {
    /// The underlying event; its author is the sender
    pub event: Event,
    /// Recipient's public key (hex), first `p` tag
    pub recipient_pubkey: Option<String>,
    /// Event being zapped, first `e` tag
    pub zapped_event: Option<String>,
    /// Amount in millisats from the `amount` tag
    pub amount_msats: Option<u64>,
}

impl ZapRequest {
    pub fn from_event(event: Event) -> Result<Self, Nip57Error> {
        if event.kind != KIND_ZAP_REQUEST {
            return Err(Nip57Error::InvalidZapRequest(format!(
                "expected kind {}, got {}",
                KIND_ZAP_REQUEST, event.kind
            )));
        }

        Ok(Self {
            recipient_pubkey: event.first_tag_value("p").map(str::to_string),
            zapped_event: event.first_tag_value("e").map(str::to_string),
            amount_msats: event.first_tag_value("amount").and_then(|v| v.parse().ok()),
            event,
        })
    }

    /// Sender's pubkey.
    pub fn sender(&self) -> &str {
        &self.event.pubkey
    }

    /// Comment attached by the sender.
    pub fn message(&self) -> &str {
        &self.event.content
    }
}

/// A zap receipt (kind 9735)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapReceipt {
    pub event: Event,
    /// Zap receiver, first `p` tag
    pub recipient_pubkey: Option<String>,
    /// Zapped event, first `e` tag
    pub zapped_event: Option<String>,
    pub bolt11: Option<String>,
    /// JSON-encoded zap request
    pub description: Option<String>,
}

impl ZapReceipt {
    pub fn from_event(event: Event) -> Result<Self, Nip57Error> {
        if event.kind != KIND_ZAP_RECEIPT {
            return Err(Nip57Error::InvalidZapReceipt(format!(
                "expected kind {}, got {}",
                KIND_ZAP_RECEIPT, event.kind
            )));
        }

        let mut recipient_pubkey = None;
        let mut zapped_event = None;
        let mut bolt11 = None;
        let mut description = None;

        for tag in &event.tags {
            let (Some(name), Some(value)) = (tag.first(), tag.get(1)) else {
                continue;
            };
            let slot = match name.as_str() {
                "p" => &mut recipient_pubkey,
                "e" => &mut zapped_event,
                "bolt11" => &mut bolt11,
                "description" => &mut description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.clone());
            }
        }

        Ok(Self {
            event,
            recipient_pubkey,
            zapped_event,
            bolt11,
            description,
        })
    }

    /// Parse the zap request from the `description` tag.
    pub fn zap_request(&self) -> Result<ZapRequest, Nip57Error> {
        let description = self
            .description
            .as_deref()
            .ok_or_else(|| Nip57Error::MissingTag("description".to_string()))?;
        let event: Event = serde_json::from_str(description)?;
        ZapRequest::from_event(event)
    }

    /// Paid amount in millisats: bolt11 first, then the request's `amount` tag.
    pub fn amount_msats(&self, request: &ZapRequest) -> Option<u64> {
        self.bolt11
            .as_deref()
            .and_then(bolt11_amount_msats)
            .or(request.amount_msats)
    }
}

/// Amount encoded in a BOLT-11 invoice's human-readable part, in millisats.
///
/// Returns `None` for invoices without an amount or with a malformed one.
pub fn bolt11_amount_msats(invoice: &str) -> Option<u64> {
    let invoice = invoice.trim().to_ascii_lowercase();
    let invoice = invoice.strip_prefix("lightning:").unwrap_or(&invoice);
    let separator = invoice.rfind('1')?;
    let hrp = invoice[..separator].strip_prefix("ln")?;

    let amount_start = hrp.find(|c: char| c.is_ascii_digit())?;
    let amount = &hrp[amount_start..];
    let (digits, multiplier) = match amount.char_indices().last()? {
        (_, c) if c.is_ascii_digit() => (amount, None),
        (idx, c) => (&amount[..idx], Some(c)),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    match multiplier {
        None => value.checked_mul(MSATS_PER_BTC),
        Some('m') => value.checked_mul(MSATS_PER_BTC / 1_000),
        Some('u') => value.checked_mul(MSATS_PER_BTC / 1_000_000),
        Some('n') => value.checked_mul(MSATS_PER_BTC / 1_000_000_000),
        // pico-btc must land on a whole millisat
        Some('p') if value % 10 == 0 => Some(value / 10),
        _ => None,
    }
}

/// Millisats to whole sats, rounding down.
pub fn msats_to_sats(msats: u64) -> u64 {
    msats / MSATS_PER_SAT
}
