//! Reference resolver.
//!
//! Turns the identifiers embedded in notes and messages into typed,
//! display-ready references by cross-linking them against locally cached
//! posts, articles, profiles and raw events. Resolution only reads the
//! [`ResolverContext`]; persisting anything is up to the caller.
//!
//! Classification precedence for each identifier, first match wins:
//!
//! 1. profile id (`npub`, `nprofile`) → [`Reference::Profile`]
//! 2. known post with a known author → [`Reference::Note`]
//! 3. `naddr` of a long-form article whose article and author are known → [`Reference::Article`]
//! 4. raw highlight event with text and an `a` tag → [`Reference::Highlight`]
//! 5. raw zap receipt → [`Reference::Zap`], omitted when sender, receiver or amount is missing
//! 6. anything else → [`Reference::Unsupported`]
//!
//! A referenced note carries its own nested references, and those are
//! hydrated like any other (author, attachments), except that their own
//! `nostr_uris` stay empty. Mutually quoting notes stop after one level.

mod attachments;
mod model;
mod resolve;

pub use attachments::{attachments, detect_mime_type, detect_uri_type, find_urls};
pub use model::*;
pub use resolve::{ResolverContext, SourceText};
