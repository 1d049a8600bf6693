use super::attachments::attachments;
use super::model::{
    Article, CdnResource, LinkPreview, NostrReference, Post, Profile, Reference, ReferencedArticle,
    ReferencedHighlight, ReferencedNote, ReferencedUser, ReferencedZap,
};
use crate::nip01::{Event, KIND_HIGHLIGHT, KIND_LONG_FORM_CONTENT, KIND_ZAP_RECEIPT};
use crate::nip19::{AddressPointer, Nip19Entity, ellipsize_npub};
use crate::nip21::{NostrUriMatch, find_matches};
use crate::nip23::reading_time_minutes;
use crate::nip57::{ZapReceipt, msats_to_sats};
use std::collections::HashMap;
use tracing::debug;

/// Nested references below this depth are left empty.
const MAX_NESTING: u8 = 1;

/// A text to scan for identifiers, with the id of the note or message it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub id: String,
    pub content: String,
}

impl SourceText {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

impl From<&Post> for SourceText {
    fn from(post: &Post) -> Self {
        Self::new(post.post_id.clone(), post.content.clone())
    }
}

/// Everything known locally that references can be resolved against.
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    /// Posts by event id
    pub posts: HashMap<String, Post>,
    /// Articles by `a` tag coordinate (`kind:pubkey:identifier`)
    pub articles: HashMap<String, Article>,
    /// Profiles by pubkey
    pub profiles: HashMap<String, Profile>,
    /// Raw events by id
    pub events: HashMap<String, Event>,
    /// CDN resources by source url
    pub cdn_resources: HashMap<String, CdnResource>,
    /// Link previews by url
    pub link_previews: HashMap<String, LinkPreview>,
    /// Video thumbnail url by video url
    pub video_thumbnails: HashMap<String, String>,
}

impl ResolverContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&mut self, post: Post) {
        self.posts.insert(post.post_id.clone(), post);
    }

    pub fn add_article(&mut self, article: Article) {
        self.articles.insert(article.a_tag.clone(), article);
    }

    pub fn add_profile(&mut self, profile: Profile) {
        self.profiles.insert(profile.profile_id.clone(), profile);
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.insert(event.id.clone(), event);
    }

    /// References in one text, in order of appearance. Duplicates each get an entry.
    pub fn resolve(&self, source: &SourceText) -> Vec<NostrReference> {
        self.resolve_at(&source.id, &source.content, 0)
    }

    /// References of several texts, concatenated in input order.
    pub fn resolve_all(&self, sources: &[SourceText]) -> Vec<NostrReference> {
        sources
            .iter()
            .flat_map(|source| self.resolve(source))
            .collect()
    }

    fn resolve_at(&self, source_id: &str, content: &str, depth: u8) -> Vec<NostrReference> {
        find_matches(content)
            .into_iter()
            .filter_map(|m| self.resolve_match(source_id, m, depth))
            .collect()
    }

    fn nested(&self, source_id: &str, content: &str, depth: u8) -> Vec<NostrReference> {
        if depth >= MAX_NESTING {
            return Vec::new();
        }
        self.resolve_at(source_id, content, depth + 1)
    }

    fn resolve_match(&self, source_id: &str, m: NostrUriMatch, depth: u8) -> Option<NostrReference> {
        let raw_event = m.entity.event_hex().and_then(|id| self.events.get(&id));
        let reference = self.classify(&m, raw_event, depth)?;

        Some(NostrReference {
            source_id: source_id.to_string(),
            referenced_event_alt: raw_event
                .and_then(|event| event.first_tag_value("alt"))
                .map(str::to_string),
            uri: m.uri,
            reference,
        })
    }

    fn classify(&self, m: &NostrUriMatch, raw_event: Option<&Event>, depth: u8) -> Option<Reference> {
        if let Some(user_id) = m.entity.profile_hex() {
            return Some(Reference::Profile(self.referenced_user(user_id)));
        }

        if let Some(note) = m
            .entity
            .note_hex()
            .and_then(|id| self.referenced_note(&id, depth))
        {
            return Some(Reference::Note(Box::new(note)));
        }

        if let Nip19Entity::Address(address) = &m.entity {
            if let Some(article) = self.referenced_article(&m.bech32, address) {
                return Some(Reference::Article(article));
            }
        }

        if let Some(event) = raw_event {
            if let Some(highlight) = referenced_highlight(event) {
                return Some(Reference::Highlight(highlight));
            }
            if event.kind == KIND_ZAP_RECEIPT {
                return self
                    .referenced_zap(event, depth)
                    .map(|zap| Reference::Zap(Box::new(zap)));
            }
        }

        Some(Reference::Unsupported)
    }

    fn referenced_user(&self, user_id: String) -> ReferencedUser {
        let handle = match self.profiles.get(&user_id) {
            Some(profile) => profile.username(),
            None => ellipsize_npub(&user_id),
        };
        ReferencedUser { user_id, handle }
    }

    fn referenced_note(&self, post_id: &str, depth: u8) -> Option<ReferencedNote> {
        let post = self.posts.get(post_id)?;
        let author = self.profiles.get(&post.author_id)?;

        Some(ReferencedNote {
            post_id: post.post_id.clone(),
            created_at: post.created_at,
            content: post.content.clone(),
            author_id: post.author_id.clone(),
            author_name: author.author_name(),
            author_avatar_url: author.avatar_url.clone(),
            author_internet_identifier: author.internet_identifier.clone(),
            author_lightning_address: author.lightning_address.clone(),
            attachments: attachments(&post.post_id, &post.content, self),
            nostr_uris: self.nested(&post.post_id, &post.content, depth),
            raw: post.raw.clone(),
        })
    }

    fn referenced_article(&self, naddr: &str, address: &AddressPointer) -> Option<ReferencedArticle> {
        if address.kind != u32::from(KIND_LONG_FORM_CONTENT) {
            return None;
        }
        let article = self.articles.get(&address.coordinate())?;
        let author = self.profiles.get(&hex::encode(address.pubkey))?;

        Some(ReferencedArticle {
            naddr: naddr.to_string(),
            a_tag: article.a_tag.clone(),
            event_id: article.event_id.clone(),
            article_id: article.article_id.clone(),
            title: article.title.clone(),
            author_id: article.author_id.clone(),
            author_name: author.author_name(),
            author_avatar_url: author.avatar_url.clone(),
            created_at: article.created_at,
            raw: article.raw.clone(),
            image_url: article.image_url.clone(),
            reading_time_minutes: article.words_count.map(reading_time_minutes),
        })
    }

    fn referenced_zap(&self, event: &Event, depth: u8) -> Option<ReferencedZap> {
        let receipt = ZapReceipt::from_event(event.clone()).ok()?;
        let request = match receipt.zap_request() {
            Ok(request) => request,
            Err(e) => {
                debug!("Skipping zap {} without a usable request: {}", event.id, e);
                return None;
            }
        };

        let receiver_id = receipt.recipient_pubkey.clone()?;
        let sender_id = Some(request.sender()).filter(|s| !s.is_empty())?.to_string();
        let amount_sats = msats_to_sats(receipt.amount_msats(&request)?);

        let zapped_event_id = receipt
            .zapped_event
            .clone()
            .or_else(|| request.zapped_event.clone());
        let zapped_post = zapped_event_id.as_ref().and_then(|id| self.posts.get(id));
        let sender = self.profiles.get(&sender_id);
        let receiver = self.profiles.get(&receiver_id);

        Some(ReferencedZap {
            sender_avatar_url: sender.and_then(|p| p.avatar_url.clone()),
            receiver_display_name: receiver
                .and_then(|p| p.display_name.clone().or_else(|| p.handle.clone())),
            receiver_avatar_url: receiver.and_then(|p| p.avatar_url.clone()),
            zapped_event_content: zapped_post.map(|post| post.content.clone()),
            zapped_event_hashtags: zapped_post
                .map(|post| post.hashtags.clone())
                .unwrap_or_default(),
            zapped_event_nostr_uris: zapped_post
                .map(|post| self.nested(&post.post_id, &post.content, depth))
                .unwrap_or_default(),
            message: request.message().to_string(),
            created_at: event.created_at,
            sender_id,
            receiver_id,
            zapped_event_id,
            amount_sats,
        })
    }
}

fn referenced_highlight(event: &Event) -> Option<ReferencedHighlight> {
    if event.kind != KIND_HIGHLIGHT || event.content.is_empty() {
        return None;
    }
    let a_tag = event
        .tags
        .iter()
        .find(|tag| tag.first().map(String::as_str) == Some("a"))?;

    Some(ReferencedHighlight {
        text: event.content.clone(),
        a_tag: a_tag.clone(),
        event_id: event.id.clone(),
        author_id: event.first_tag_value("p").map(str::to_string),
    })
}
