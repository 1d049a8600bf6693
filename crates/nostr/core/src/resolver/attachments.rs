//! Classification of the plain links found in a note.

use super::ResolverContext;
use super::model::{EventUri, EventUriType};
use crate::nip21::is_nostr_uri;
use linkify::{LinkFinder, LinkKind};

/// Mime types guessed from a url's file extension.
const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("avif", "image/avif"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("m3u8", "application/x-mpegURL"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("pdf", "application/pdf"),
];

/// Every link in `content`, in order of appearance.
pub fn find_urls(content: &str) -> Vec<String> {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder
        .links(content)
        .map(|link| link.as_str().to_string())
        .collect()
}

/// Mime type implied by the path extension, ignoring query and fragment.
pub fn detect_mime_type(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let (_, extension) = file.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

pub fn detect_uri_type(url: &str, mime_type: Option<&str>) -> EventUriType {
    match mime_type.map(type_from_mime) {
        Some(uri_type) if uri_type != EventUriType::Other => uri_type,
        _ => type_from_url(url),
    }
}

fn type_from_mime(mime_type: &str) -> EventUriType {
    if mime_type.starts_with("image") {
        EventUriType::Image
    } else if mime_type.starts_with("video") {
        EventUriType::Video
    } else if mime_type.starts_with("audio") {
        EventUriType::Audio
    } else if mime_type.ends_with("pdf") {
        EventUriType::Pdf
    } else {
        EventUriType::Other
    }
}

fn type_from_url(url: &str) -> EventUriType {
    if url.contains(".youtube.com") || url.contains("/youtube.com") || url.contains("/youtu.be") {
        EventUriType::YouTube
    } else if url.contains(".rumble.com") || url.contains("/rumble.com") {
        EventUriType::Rumble
    } else if url.contains("/open.spotify.com/") {
        EventUriType::Spotify
    } else if url.contains("/listen.tidal.com/") {
        EventUriType::Tidal
    } else if url.contains("/github.com/") {
        EventUriType::GitHub
    } else {
        EventUriType::Other
    }
}

/// Links in `content` other than nostr identifiers, hydrated from the context maps.
pub fn attachments(source_id: &str, content: &str, ctx: &ResolverContext) -> Vec<EventUri> {
    find_urls(content)
        .into_iter()
        .filter(|url| !is_nostr_uri(url))
        .map(|url| classify(source_id, url, ctx))
        .collect()
}

fn classify(source_id: &str, url: String, ctx: &ResolverContext) -> EventUri {
    let cdn = ctx.cdn_resources.get(&url);
    let preview = ctx.link_previews.get(&url);
    let preview_thumbnail_cdn = preview
        .and_then(|p| p.thumbnail_url.as_ref())
        .and_then(|thumb| ctx.cdn_resources.get(thumb));

    let mime_type = detect_mime_type(&url)
        .map(str::to_string)
        .or_else(|| cdn.and_then(|c| c.content_type.clone()))
        .or_else(|| preview.and_then(|p| p.mime_type.clone()));
    let uri_type = detect_uri_type(&url, mime_type.as_deref());

    let variants = cdn
        .into_iter()
        .chain(preview_thumbnail_cdn)
        .flat_map(|resource| resource.variants.iter().cloned())
        .collect();

    EventUri {
        event_id: source_id.to_string(),
        thumbnail: non_blank(preview.and_then(|p| p.thumbnail_url.as_ref()))
            .or_else(|| ctx.video_thumbnails.get(&url).cloned()),
        title: non_blank(preview.and_then(|p| p.title.as_ref())),
        description: non_blank(preview.and_then(|p| p.description.as_ref())),
        author_avatar_url: non_blank(preview.and_then(|p| p.author_avatar_url.as_ref())),
        url,
        uri_type,
        mime_type,
        variants,
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}
