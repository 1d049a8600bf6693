//! NIP-23: Long-form Content
//!
//! Kind 30023 articles: metadata tags and reading-time estimates.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/23.md>

use crate::nip01::{Event, KIND_LONG_FORM_CONTENT};

/// Reading speed used for estimates.
pub const WORDS_PER_MINUTE: u32 = 200;

/// Metadata tags of a long-form article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleMetadata {
    /// `d` tag
    pub identifier: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub image: Option<String>,
    pub published_at: Option<u64>,
    pub hashtags: Vec<String>,
}

impl ArticleMetadata {
    /// Read metadata from a kind 30023 event. Other kinds yield `None`.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != KIND_LONG_FORM_CONTENT {
            return None;
        }

        Some(Self {
            identifier: event.first_tag_value("d").unwrap_or_default().to_string(),
            title: non_blank(event.first_tag_value("title")),
            summary: non_blank(event.first_tag_value("summary")),
            image: non_blank(event.first_tag_value("image")),
            published_at: event
                .first_tag_value("published_at")
                .and_then(|v| v.parse().ok()),
            hashtags: event.hashtags(),
        })
    }
}

/// Whitespace-separated word count.
pub fn count_words(content: &str) -> u32 {
    u32::try_from(content.split_whitespace().count()).unwrap_or(u32::MAX)
}

/// Minutes to read `words`, rounded up, never below one.
pub fn reading_time_minutes(words: u32) -> u32 {
    words.div_ceil(WORDS_PER_MINUTE).max(1)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time_minutes(0), 1);
        assert_eq!(reading_time_minutes(1), 1);
        assert_eq!(reading_time_minutes(200), 1);
        assert_eq!(reading_time_minutes(201), 2);
        assert_eq!(reading_time_minutes(1000), 5);
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words("  one two\nthree\tfour "), 4);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn test_metadata_from_event() {
        let event = Event {
            id: "1".repeat(64),
            pubkey: "2".repeat(64),
            created_at: 10,
            kind: KIND_LONG_FORM_CONTENT,
            tags: vec![
                vec!["d".to_string(), "lorem-ipsum".to_string()],
                vec!["title".to_string(), "Lorem Ipsum".to_string()],
                vec!["summary".to_string(), "  ".to_string()],
                vec!["published_at".to_string(), "1296962229".to_string()],
                vec!["t".to_string(), "placeholder".to_string()],
            ],
            content: "body".to_string(),
            sig: String::new(),
        };

        let meta = ArticleMetadata::from_event(&event).unwrap();
        assert_eq!(meta.identifier, "lorem-ipsum");
        assert_eq!(meta.title.as_deref(), Some("Lorem Ipsum"));
        assert_eq!(meta.summary, None);
        assert_eq!(meta.published_at, Some(1296962229));
        assert_eq!(meta.hashtags, vec!["placeholder"]);

        let note = Event { kind: 1, ..event };
        assert!(ArticleMetadata::from_event(&note).is_none());
    }
}
