//! TikTok strategy: short-video API for media, oEmbed for metadata.
//!
//! The two calls are independent and run concurrently. The data call is
//! retried on transient failures; the oEmbed call is best-effort and only
//! enriches the title and author.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaItem, MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Quality, Rendition, select_rendition};
use crate::retry::{RetryPolicy, with_retry};
use crate::transport::{RequestBody, RequestOptions};

use super::scrape::absolutize_url;
use super::{Endpoints, Extractor, build_item, carousel_index};

// ==================== API Types ====================

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default = "missing_code")]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<VideoData>,
}

fn missing_code() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct MusicInfo {
    play: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    unique_id: Option<String>,
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoData {
    id: Option<String>,
    #[serde(default)]
    title: String,
    play: Option<String>,
    hdplay: Option<String>,
    wmplay: Option<String>,
    music: Option<String>,
    music_info: Option<MusicInfo>,
    #[serde(default)]
    images: Vec<String>,
    author: Option<Author>,
    play_count: Option<u64>,
    digg_count: Option<u64>,
}

impl VideoData {
    fn renditions(&self) -> Vec<Rendition> {
        [
            ("hdplay", &self.hdplay),
            ("play", &self.play),
            ("wmplay", &self.wmplay),
        ]
        .into_iter()
        .filter_map(|(label, url)| {
            url.as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| Rendition::new(label, url))
        })
        .collect()
    }

    fn music_url(&self) -> Option<&str> {
        self.music_info
            .as_ref()
            .and_then(|info| info.play.as_deref())
            .or(self.music.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
}

// ==================== TikTokExtractor ====================

/// Resolves TikTok videos and photo-mode posts.
#[derive(Debug, Clone)]
pub struct TikTokExtractor {
    api_base: String,
    oembed_base: String,
    retry: RetryPolicy,
}

impl Default for TikTokExtractor {
    fn default() -> Self {
        let endpoints = Endpoints::default();
        Self::with_base_urls(endpoints.tiktok_api, endpoints.tiktok_oembed)
    }
}

impl TikTokExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against custom API and oEmbed hosts (for testing with wiremock).
    #[must_use]
    pub fn with_base_urls(api_base: impl Into<String>, oembed_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            oembed_base: oembed_base.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_data(&self, url: &Url, ctx: &ResolveContext) -> Result<ApiResponse, ExtractError> {
        let api_url = format!("{}/api/", self.api_base);
        let hd = ctx.quality().hd_flag();
        let request = RequestOptions::new();
        let response = with_retry(&self.retry, "tiktok-api", || {
            ctx.transport().post(
                &api_url,
                RequestBody::form(&[("url", url.as_str()), ("hd", hd)]),
                &request,
            )
        })
        .await?;
        response.json().map_err(|error| {
            ExtractError::parse(
                Platform::TikTok,
                url.as_str(),
                format!("unexpected API response: {error}"),
            )
        })
    }

    async fn fetch_oembed(&self, url: &Url, ctx: &ResolveContext) -> Option<OEmbed> {
        let oembed_url = format!(
            "{}/oembed?url={}",
            self.oembed_base,
            urlencoding::encode(url.as_str())
        );
        match ctx.transport().get(&oembed_url, &RequestOptions::new()).await {
            Ok(response) => response
                .json()
                .inspect_err(|error| debug!(error = %error, "oembed response not understood"))
                .ok(),
            Err(error) => {
                debug!(error = %error, "oembed lookup failed; continuing without it");
                None
            }
        }
    }
}

#[async_trait]
impl Extractor for TikTokExtractor {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let (data, oembed) = tokio::join!(self.fetch_data(url, ctx), self.fetch_oembed(url, ctx));
        let response = data?;
        if response.code != 0 {
            return Err(ExtractError::parse(
                Platform::TikTok,
                url.as_str(),
                format!("API rejected the video: {}", response.msg),
            )
            .into());
        }
        let Some(data) = response.data else {
            return Err(
                ExtractError::parse(Platform::TikTok, url.as_str(), "API returned no data").into(),
            );
        };

        let api_base = Url::parse(&format!("{}/", self.api_base))?;
        let files = select_files(&data, ctx.quality(), &api_base);
        if files.is_empty() {
            return Err(ExtractError::parse(
                Platform::TikTok,
                url.as_str(),
                "post has no playable video, images, or audio",
            )
            .into());
        }

        let id = data.id.as_deref().or_else(|| video_id(url));
        let total = files.len();
        let items = files
            .into_iter()
            .enumerate()
            .map(|(position, (media_type, file_url))| {
                build_item(
                    Platform::TikTok,
                    media_type,
                    &file_url,
                    id,
                    carousel_index(total, position),
                    None,
                )
            })
            .collect::<Result<Vec<MediaItem>, _>>()?;

        let oembed_title = oembed
            .as_ref()
            .and_then(|oembed| oembed.title.clone())
            .filter(|title| !title.trim().is_empty());
        let title = oembed_title
            .or_else(|| (!data.title.trim().is_empty()).then(|| data.title.clone()))
            .or_else(|| data.music_info.as_ref().and_then(|music| music.title.clone()))
            .unwrap_or_else(|| "TikTok video".to_string());
        let author = data
            .author
            .as_ref()
            .and_then(|author| author.unique_id.clone().or_else(|| author.nickname.clone()))
            .or_else(|| oembed.and_then(|oembed| oembed.author_name))
            .unwrap_or_else(|| "TikTok".to_string());
        let meta = MediaMeta::new(Platform::TikTok, title, author)
            .with_views(data.play_count)
            .with_likes(data.digg_count);

        Ok(MediaResult::new(url.as_str(), items, BTreeMap::new(), meta)?)
    }
}

/// Chooses the files to return, already absolutized against the API host.
fn select_files(data: &VideoData, quality: Quality, api_base: &Url) -> Vec<(MediaType, String)> {
    let absolute = |value: &str| absolutize_url(value, api_base);
    let music = data
        .music_url()
        .and_then(absolute)
        .map(|url| (MediaType::Audio, url));

    if quality == Quality::AudioOnly
        && let Some(music) = music.clone()
    {
        return vec![music];
    }

    if !data.images.is_empty() {
        return data
            .images
            .iter()
            .filter_map(|image| absolute(image))
            .map(|url| (MediaType::Image, url))
            .chain(music)
            .collect();
    }

    let priority = quality.labels_for(Platform::TikTok);
    select_rendition(&data.renditions(), &priority)
        .and_then(|chosen| absolute(&chosen.url))
        .map(|url| vec![(MediaType::Video, url)])
        .unwrap_or_default()
}

/// Numeric id from `/@user/video/<id>` or `/@user/photo/<id>`.
fn video_id(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| matches!(*segment, "video" | "photo"))?;
    segments
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}
