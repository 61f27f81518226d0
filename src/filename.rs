//! Deterministic filename synthesis and extension inference for media items.
//!
//! Pattern: `{platform}_{id}[_{index}].{ext}` where `id` falls back to a
//! millisecond timestamp when the platform exposes no stable identifier.

use url::Url;

use crate::media::MediaType;
use crate::platform::Platform;

/// Extensions accepted verbatim from a URL path.
const KNOWN_EXTENSIONS: [&str; 13] = [
    "jpg", "jpeg", "png", "gif", "webp", "heic", "mp4", "mov", "webm", "m4a", "mp3", "aac", "ogg",
];

/// Builds the suggested local filename for one media item.
///
/// `index` is 1-based and only given for multi-item posts.
#[must_use]
pub fn media_filename(
    platform: Platform,
    id: Option<&str>,
    index: Option<usize>,
    extension: &str,
) -> String {
    let id = id
        .map(sanitize_filename_component)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(timestamp_id);
    let extension = extension.trim_start_matches('.');
    match index {
        Some(index) => format!("{}_{id}_{index}.{extension}", platform.name()),
        None => format!("{}_{id}.{extension}", platform.name()),
    }
}

/// Infers the file extension for a media URL.
///
/// Order: known extension in the URL path, then the `mime`/content-type hint,
/// then the default for the media type.
#[must_use]
pub fn infer_extension(url: &str, content_type: Option<&str>, media_type: MediaType) -> String {
    extension_from_url(url)
        .filter(|ext| extension_fits(ext, media_type))
        .or_else(|| content_type.and_then(extension_from_content_type))
        .map_or_else(
            || default_extension(media_type).to_string(),
            str::to_string,
        )
}

pub(crate) fn extension_from_url(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .map(|known| if *known == "jpeg" { "jpg" } else { *known })
}

/// Guess file extension from a content type or a bare `image/jpg` style mime.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        _ => None,
    }
}

/// False when a URL extension contradicts the item kind (`.gif` served as mp4).
fn extension_fits(extension: &str, media_type: MediaType) -> bool {
    match media_type {
        MediaType::Image => matches!(extension, "jpg" | "png" | "gif" | "webp" | "heic"),
        MediaType::Video => matches!(extension, "mp4" | "mov" | "webm"),
        MediaType::Audio => matches!(extension, "m4a" | "mp3" | "aac" | "ogg" | "mp4"),
    }
}

fn default_extension(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Image => "jpg",
        MediaType::Video => "mp4",
        MediaType::Audio => "mp3",
    }
}

/// Replaces path separators, reserved and control characters with `_`,
/// collapsing runs and trimming leading/trailing separators.
pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches(|c| c == '_' || c == '.').to_string()
}

fn timestamp_id() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_filename_single_item() {
        assert_eq!(
            media_filename(Platform::Instagram, Some("CxYz_12"), None, "jpg"),
            "instagram_CxYz_12.jpg"
        );
    }

    #[test]
    fn test_media_filename_with_index_and_dotted_extension() {
        assert_eq!(
            media_filename(Platform::Reddit, Some("abc123"), Some(3), ".png"),
            "reddit_abc123_3.png"
        );
    }

    #[test]
    fn test_media_filename_sanitizes_separators() {
        let name = media_filename(Platform::Facebook, Some("../etc/passwd"), None, "mp4");
        assert!(!name.contains('/'), "got: {name}");
        assert!(!name.contains('\\'), "got: {name}");
        assert_eq!(name, "facebook_etc_passwd.mp4");
    }

    #[test]
    fn test_media_filename_falls_back_to_timestamp() {
        let name = media_filename(Platform::TikTok, None, None, "mp4");
        let id = name
            .strip_prefix("tiktok_")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .unwrap();
        assert!(id.chars().all(|c| c.is_ascii_digit()), "got: {name}");

        let empty = media_filename(Platform::TikTok, Some("///"), None, "mp4");
        assert!(empty.starts_with("tiktok_1"), "got: {empty}");
    }

    #[test]
    fn test_infer_extension_from_url_path() {
        assert_eq!(
            infer_extension(
                "https://i.redd.it/abc.PNG?width=640",
                None,
                MediaType::Image
            ),
            "png"
        );
        assert_eq!(
            infer_extension("https://cdn.example.com/a/b.jpeg", None, MediaType::Image),
            "jpg"
        );
    }

    #[test]
    fn test_infer_extension_from_content_type_then_default() {
        assert_eq!(
            infer_extension(
                "https://cdn.example.com/play/123",
                Some("video/mp4; codecs=avc1"),
                MediaType::Video
            ),
            "mp4"
        );
        assert_eq!(
            infer_extension("https://cdn.example.com/obj", Some("image/jpg"), MediaType::Image),
            "jpg"
        );
        assert_eq!(
            infer_extension("https://cdn.example.com/obj", None, MediaType::Audio),
            "mp3"
        );
        assert_eq!(
            infer_extension("https://cdn.example.com/v.m3u8", None, MediaType::Video),
            "mp4"
        );
        assert_eq!(
            infer_extension(
                "https://preview.redd.it/a.gif?format=mp4",
                Some("video/mp4"),
                MediaType::Video
            ),
            "mp4"
        );
    }

    #[test]
    fn test_sanitize_filename_component() {
        assert_eq!(sanitize_filename_component("a b/c\\d"), "a_b_c_d");
        assert_eq!(sanitize_filename_component("__x__"), "x");
        assert_eq!(sanitize_filename_component("v1.2"), "v1.2");
    }
}
