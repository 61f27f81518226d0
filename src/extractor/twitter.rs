//! Twitter/X strategy backed by the FxTwitter status API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaItem, MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Quality, is_manifest};
use crate::transport::RequestOptions;
use crate::user_agent::tool_user_agent;

use super::scrape::short_title;
use super::{Endpoints, Extractor, build_item, carousel_index};

const IMAGE_HOST: &str = "pbs.twimg.com";

const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    tweet: Option<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: Option<String>,
    #[serde(default)]
    text: String,
    author: Option<TweetAuthor>,
    views: Option<u64>,
    likes: Option<u64>,
    media: Option<TweetMedia>,
}

#[derive(Debug, Deserialize)]
struct TweetAuthor {
    screen_name: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetMedia {
    #[serde(default)]
    all: Vec<MediaEntry>,
}

#[derive(Debug, Deserialize)]
struct MediaEntry {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    #[serde(default, alias = "formats")]
    variants: Vec<Variant>,
}

#[derive(Debug, Clone, Deserialize)]
struct Variant {
    url: String,
    content_type: Option<String>,
    bitrate: Option<u64>,
}

/// Resolves tweets with photos, videos, and GIFs.
#[derive(Debug, Clone)]
pub struct TwitterExtractor {
    api_base: String,
}

impl Default for TwitterExtractor {
    fn default() -> Self {
        Self::with_base_url(Endpoints::default().twitter_api)
    }
}

impl TwitterExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against a custom API host (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Extractor for TwitterExtractor {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let Some(status_id) = status_id(url) else {
            return Err(ExtractError::parse(
                Platform::Twitter,
                url.as_str(),
                "URL has no status id (expected /<user>/status/<id>)",
            )
            .into());
        };

        let api_url = format!("{}/status/{status_id}", self.api_base);
        let response: StatusResponse = ctx
            .transport()
            .get(
                &api_url,
                &RequestOptions::new().header("User-Agent", tool_user_agent()),
            )
            .await?
            .json()?;
        let Some(tweet) = response.tweet.filter(|_| response.code == 200) else {
            return Err(ExtractError::parse(
                Platform::Twitter,
                url.as_str(),
                format!("status API returned {} {}", response.code, response.message),
            )
            .into());
        };

        let files: Vec<(MediaType, String)> = tweet
            .media
            .iter()
            .flat_map(|media| media.all.iter())
            .filter_map(|entry| entry_file(entry, ctx.quality()))
            .collect();

        let id = tweet.id.as_deref().unwrap_or(status_id);
        let total = files.len();
        let items = files
            .into_iter()
            .enumerate()
            .map(|(position, (media_type, file_url))| {
                build_item(
                    Platform::Twitter,
                    media_type,
                    &file_url,
                    Some(id),
                    carousel_index(total, position),
                    None,
                )
            })
            .collect::<Result<Vec<MediaItem>, _>>()?;

        let title = short_title(&tweet.text, TITLE_MAX_CHARS).unwrap_or_else(|| format!("Tweet {id}"));
        let author = tweet
            .author
            .as_ref()
            .and_then(|author| author.screen_name.clone().or_else(|| author.name.clone()))
            .unwrap_or_else(|| "unknown".to_string());
        let meta = MediaMeta::new(Platform::Twitter, title, author)
            .with_views(tweet.views)
            .with_likes(tweet.likes);

        Ok(MediaResult::new(url.as_str(), items, BTreeMap::new(), meta)?)
    }
}

fn entry_file(entry: &MediaEntry, quality: Quality) -> Option<(MediaType, String)> {
    match entry.kind.as_str() {
        "photo" => entry
            .url
            .as_deref()
            .map(|url| (MediaType::Image, original_photo_url(url))),
        "video" | "gif" => pick_variant(&entry.variants, quality)
            .or_else(|| entry.url.clone().filter(|url| !is_manifest(url)))
            .map(|url| (MediaType::Video, url)),
        _ => None,
    }
}

/// Ranks direct variants by bitrate and picks by quality hint.
fn pick_variant(variants: &[Variant], quality: Quality) -> Option<String> {
    let mut direct: Vec<&Variant> = variants
        .iter()
        .filter(|variant| {
            !is_manifest(&variant.url)
                && variant
                    .content_type
                    .as_deref()
                    .is_none_or(|content_type| !content_type.contains("mpegurl"))
        })
        .collect();
    if direct.is_empty() {
        return None;
    }
    direct.sort_by_key(|variant| variant.bitrate.unwrap_or(0));
    let chosen = match quality {
        Quality::Best | Quality::High | Quality::AudioOnly => direct[direct.len() - 1],
        Quality::Medium => direct[direct.len() / 2],
        Quality::Low => direct[0],
    };
    Some(chosen.url.clone())
}

/// Requests the original-size rendition from the Twitter image CDN.
fn original_photo_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.host_str() != Some(IMAGE_HOST) {
        return url.to_string();
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != "name")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("name", "orig");
    parsed.to_string()
}

fn status_id(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| matches!(*segment, "status" | "statuses"))?;
    segments
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}
