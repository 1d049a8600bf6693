//! Lookup records the resolver reads and the hydrated references it produces.

use crate::nip01::{Event, KIND_LONG_FORM_CONTENT, KIND_METADATA};
use crate::nip19::ellipsize_npub;
use crate::nip23::{ArticleMetadata, count_words};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A cached short text note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    pub author_id: String,
    pub created_at: u64,
    pub content: String,
    pub hashtags: Vec<String>,
    /// The event as received, JSON encoded
    pub raw: String,
}

impl Post {
    pub fn from_event(event: &Event) -> Self {
        Self {
            post_id: event.id.clone(),
            author_id: event.pubkey.clone(),
            created_at: event.created_at,
            content: event.content.clone(),
            hashtags: event.hashtags(),
            raw: serde_json::to_string(event).unwrap_or_default(),
        }
    }
}

/// A cached long-form article, keyed by its `d` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub article_id: String,
    pub event_id: String,
    pub author_id: String,
    /// `30023:<pubkey>:<identifier>`
    pub a_tag: String,
    pub title: Option<String>,
    pub created_at: u64,
    pub image_url: Option<String>,
    pub words_count: Option<u32>,
    pub raw: String,
}

impl Article {
    /// Build from a kind 30023 event; other kinds yield `None`.
    pub fn from_event(event: &Event) -> Option<Self> {
        let meta = ArticleMetadata::from_event(event)?;
        Some(Self {
            a_tag: format!("{}:{}:{}", KIND_LONG_FORM_CONTENT, event.pubkey, meta.identifier),
            article_id: meta.identifier,
            event_id: event.id.clone(),
            author_id: event.pubkey.clone(),
            title: meta.title,
            created_at: meta.published_at.unwrap_or(event.created_at),
            image_url: meta.image,
            words_count: Some(count_words(&event.content)),
            raw: serde_json::to_string(event).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct MetadataContent {
    name: Option<String>,
    display_name: Option<String>,
    picture: Option<String>,
    nip05: Option<String>,
    lud16: Option<String>,
}

/// A cached profile, keyed by pubkey.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub internet_identifier: Option<String>,
    pub lightning_address: Option<String>,
}

impl Profile {
    /// Parse a kind 0 event. Malformed metadata yields `None`.
    pub fn from_metadata_event(event: &Event) -> Option<Self> {
        if event.kind != KIND_METADATA {
            return None;
        }
        let content: MetadataContent = match serde_json::from_str(&event.content) {
            Ok(content) => content,
            Err(e) => {
                debug!("Ignoring malformed metadata for {}: {}", event.pubkey, e);
                return None;
            }
        };
        Some(Self {
            profile_id: event.pubkey.clone(),
            handle: non_blank(content.name),
            display_name: non_blank(content.display_name),
            avatar_url: non_blank(content.picture),
            internet_identifier: non_blank(content.nip05),
            lightning_address: non_blank(content.lud16),
        })
    }

    /// Handle, else display name, else the ellipsized npub.
    pub fn username(&self) -> String {
        self.handle
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| ellipsize_npub(&self.profile_id))
    }

    /// Display name, else handle, else the ellipsized npub.
    pub fn author_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.handle.clone())
            .unwrap_or_else(|| ellipsize_npub(&self.profile_id))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One rendition of a media file served by the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnVariant {
    pub width: u32,
    pub height: u32,
    pub media_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnResource {
    pub url: String,
    pub content_type: Option<String>,
    pub variants: Vec<CdnVariant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    pub mime_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author_avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventUriType {
    Image,
    Video,
    Audio,
    Pdf,
    YouTube,
    Rumble,
    Spotify,
    Tidal,
    GitHub,
    Other,
}

/// A non-nostr link found in a note, classified for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUri {
    /// Id of the text the link was found in
    pub event_id: String,
    pub url: String,
    pub uri_type: EventUriType,
    pub mime_type: Option<String>,
    pub variants: Vec<CdnVariant>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub author_avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedUser {
    pub user_id: String,
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedNote {
    pub post_id: String,
    pub created_at: u64,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub author_internet_identifier: Option<String>,
    pub author_lightning_address: Option<String>,
    pub attachments: Vec<EventUri>,
    /// References inside this note. Never hydrated past one level.
    pub nostr_uris: Vec<NostrReference>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedArticle {
    pub naddr: String,
    pub a_tag: String,
    pub event_id: String,
    pub article_id: String,
    pub title: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub created_at: u64,
    pub raw: String,
    pub image_url: Option<String>,
    pub reading_time_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedHighlight {
    pub text: String,
    pub a_tag: Vec<String>,
    pub event_id: String,
    pub author_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedZap {
    pub sender_id: String,
    pub sender_avatar_url: Option<String>,
    pub receiver_id: String,
    pub receiver_display_name: Option<String>,
    pub receiver_avatar_url: Option<String>,
    pub zapped_event_id: Option<String>,
    pub zapped_event_content: Option<String>,
    pub zapped_event_hashtags: Vec<String>,
    pub zapped_event_nostr_uris: Vec<NostrReference>,
    pub amount_sats: u64,
    pub message: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    Profile,
    Note,
    Article,
    Highlight,
    Zap,
    Unsupported,
}

/// What an identifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Reference {
    Profile(ReferencedUser),
    Note(Box<ReferencedNote>),
    Article(ReferencedArticle),
    Highlight(ReferencedHighlight),
    Zap(Box<ReferencedZap>),
    Unsupported,
}

impl Reference {
    pub fn kind(&self) -> ReferenceType {
        match self {
            Reference::Profile(_) => ReferenceType::Profile,
            Reference::Note(_) => ReferenceType::Note,
            Reference::Article(_) => ReferenceType::Article,
            Reference::Highlight(_) => ReferenceType::Highlight,
            Reference::Zap(_) => ReferenceType::Zap,
            Reference::Unsupported => ReferenceType::Unsupported,
        }
    }
}

/// One identifier occurrence in a source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrReference {
    /// Id of the text the identifier was found in
    pub source_id: String,
    /// The identifier as written
    pub uri: String,
    /// First `alt` tag of the referenced event, when it is known
    pub referenced_event_alt: Option<String>,
    pub reference: Reference,
}

impl NostrReference {
    pub fn kind(&self) -> ReferenceType {
        self.reference.kind()
    }
}
