//! Normalized media records returned by every strategy.
//!
//! [`MediaItem`] and [`MediaResult`] can only be built through their
//! constructors, which enforce the record invariants: absolute item URLs,
//! filesystem-safe filenames, and at least one item per result.

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::error::ExtractError;
use crate::filename::sanitize_filename_component;
use crate::platform::Platform;

/// Kind of a retrievable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected item construction (empty or relative URL).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid media URL '{url}': {reason}")]
pub struct InvalidMediaItem {
    /// The offending URL.
    pub url: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// One retrievable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    media_type: MediaType,
    url: String,
    filename: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
}

impl MediaItem {
    /// Creates an item, validating the URL and sanitizing the filename.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMediaItem`] when `url` is empty or not an absolute
    /// `http`/`https` URL.
    pub fn new(
        media_type: MediaType,
        url: impl Into<String>,
        filename: impl AsRef<str>,
    ) -> Result<Self, InvalidMediaItem> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(InvalidMediaItem {
                url,
                reason: "URL is empty",
            });
        }
        let is_absolute_http = Url::parse(&url)
            .ok()
            .is_some_and(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host());
        if !is_absolute_http {
            return Err(InvalidMediaItem {
                url,
                reason: "URL must be an absolute http(s) URL",
            });
        }

        Ok(Self {
            media_type,
            url,
            filename: safe_filename(filename.as_ref()),
            headers: BTreeMap::new(),
        })
    }

    /// Adds an item-local request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Item-local headers; these override result-level headers on merge.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Merges `defaults` with this item's headers (item wins).
    #[must_use]
    pub fn merged_headers(&self, defaults: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = defaults.clone();
        merged.extend(
            self.headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        merged
    }
}

fn safe_filename(name: &str) -> String {
    let (stem, extension) = name.rsplit_once('.').unwrap_or((name, ""));
    let stem = sanitize_filename_component(stem);
    let stem = if stem.is_empty() {
        "media".to_string()
    } else {
        stem
    };
    let extension = sanitize_filename_component(extension);
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

/// Descriptive metadata for a resolved post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaMeta {
    pub title: String,
    pub author: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
}

impl MediaMeta {
    /// Creates metadata with no engagement counters.
    #[must_use]
    pub fn new(platform: Platform, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            platform,
            views: None,
            likes: None,
        }
    }

    #[must_use]
    pub fn with_views(mut self, views: Option<u64>) -> Self {
        self.views = views;
        self
    }

    #[must_use]
    pub fn with_likes(mut self, likes: Option<u64>) -> Self {
        self.likes = likes;
        self
    }
}

/// The normalized output of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaResult {
    urls: Vec<MediaItem>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    meta: MediaMeta,
}

impl MediaResult {
    /// Creates a result from items in source presentation order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Parse`] tagged with `meta.platform` when
    /// `urls` is empty; zero items is never a success.
    pub fn new(
        source_url: &str,
        urls: Vec<MediaItem>,
        headers: BTreeMap<String, String>,
        meta: MediaMeta,
    ) -> Result<Self, ExtractError> {
        if urls.is_empty() {
            return Err(ExtractError::parse(
                meta.platform,
                source_url,
                "no downloadable media found in post",
            ));
        }
        Ok(Self {
            urls,
            headers,
            meta,
        })
    }

    #[must_use]
    pub fn urls(&self) -> &[MediaItem] {
        &self.urls
    }

    /// Default headers applicable to every item.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn meta(&self) -> &MediaMeta {
        &self.meta
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.meta.platform
    }

    /// Headers to send when fetching `item`: result defaults merged with the item's own.
    #[must_use]
    pub fn headers_for(&self, item: &MediaItem) -> BTreeMap<String, String> {
        item.merged_headers(&self.headers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn meta() -> MediaMeta {
        MediaMeta::new(Platform::Reddit, "title", "author")
    }

    #[test]
    fn test_media_item_rejects_empty_and_relative_urls() {
        let err = MediaItem::new(MediaType::Image, "", "a.jpg").unwrap_err();
        assert_eq!(err.reason, "URL is empty");

        assert!(MediaItem::new(MediaType::Image, "/relative/a.jpg", "a.jpg").is_err());
        assert!(MediaItem::new(MediaType::Image, "data:image/png;base64,AAAA", "a.png").is_err());
        assert!(MediaItem::new(MediaType::Image, "https://cdn.example.com/a.jpg", "a.jpg").is_ok());
    }

    #[test]
    fn test_media_item_filename_has_no_separators() {
        let item =
            MediaItem::new(MediaType::Video, "https://cdn.example.com/v.mp4", "a/b\\c.mp4").unwrap();
        assert_eq!(item.filename(), "a_b_c.mp4");

        let item = MediaItem::new(MediaType::Video, "https://cdn.example.com/v.mp4", "..").unwrap();
        assert_eq!(item.filename(), "media");
    }

    #[test]
    fn test_media_result_rejects_empty_items() {
        let err = MediaResult::new("https://reddit.com/r/x", Vec::new(), BTreeMap::new(), meta())
            .unwrap_err();
        assert_eq!(err.platform(), Some(Platform::Reddit));
    }

    #[test]
    fn test_headers_for_item_overrides_result_defaults() {
        let item = MediaItem::new(MediaType::Image, "https://cdn.example.com/a.jpg", "a.jpg")
            .unwrap()
            .with_header("Referer", "https://item.example.com/");
        let mut defaults = BTreeMap::new();
        defaults.insert("Referer".to_string(), "https://result.example.com/".to_string());
        defaults.insert("Accept".to_string(), "*/*".to_string());

        let result = MediaResult::new("https://reddit.com/r/x", vec![item], defaults, meta()).unwrap();
        let merged = result.headers_for(&result.urls()[0]);
        assert_eq!(merged.get("Referer").unwrap(), "https://item.example.com/");
        assert_eq!(merged.get("Accept").unwrap(), "*/*");
    }

    #[test]
    fn test_media_result_serializes_type_field() {
        let item = MediaItem::new(MediaType::Audio, "https://cdn.example.com/a.mp3", "a.mp3").unwrap();
        let result = MediaResult::new("u", vec![item], BTreeMap::new(), meta()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["urls"][0]["type"], "audio");
        assert_eq!(json["meta"]["platform"], "reddit");
        assert!(json["meta"].get("views").is_none());
    }
}
