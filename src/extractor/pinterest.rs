//! Pinterest strategy: resolves pins through the public pidgets API.
//!
//! Handles regular image pins, video pins (`videos.video_list`), multi-page
//! story pins, country-coded hosts, and `pin.it` short links.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaItem, MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Rendition, select_rendition};
use crate::transport::RequestOptions;

use super::{Endpoints, Extractor, build_item, carousel_index, headers};

const SHORT_LINK_HOST: &str = "pin.it";

const REFERER: &str = "https://www.pinterest.com/";

// ==================== Pidgets API Types ====================

#[derive(Debug, Deserialize)]
struct PidgetsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Vec<Pin>,
}

#[derive(Debug, Deserialize)]
struct ImageVariant {
    url: Option<String>,
    width: Option<u32>,
}

impl ImageVariant {
    fn usable_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct VideoVariant {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    video_list: BTreeMap<String, VideoVariant>,
}

#[derive(Debug, Deserialize)]
struct Pinner {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregatedStats {
    saves: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AggregatedPinData {
    aggregated_stats: Option<AggregatedStats>,
}

#[derive(Debug, Deserialize)]
struct BlockImage {
    #[serde(default)]
    images: HashMap<String, ImageVariant>,
}

#[derive(Debug, Deserialize)]
struct StoryBlock {
    image: Option<BlockImage>,
    video: Option<VideoList>,
}

#[derive(Debug, Deserialize)]
struct StoryPage {
    #[serde(default)]
    blocks: Vec<StoryBlock>,
}

#[derive(Debug, Deserialize)]
struct StoryPinData {
    #[serde(default)]
    pages: Vec<StoryPage>,
}

#[derive(Debug, Deserialize)]
struct Pin {
    title: Option<String>,
    grid_title: Option<String>,
    description: Option<String>,
    pinner: Option<Pinner>,
    #[serde(default)]
    images: HashMap<String, ImageVariant>,
    videos: Option<VideoList>,
    story_pin_data: Option<StoryPinData>,
    #[serde(default)]
    reaction_counts: HashMap<String, u64>,
    aggregated_pin_data: Option<AggregatedPinData>,
}

impl Pin {
    fn title(&self) -> Option<String> {
        [&self.title, &self.grid_title, &self.description]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn likes(&self) -> Option<u64> {
        if self.reaction_counts.is_empty() {
            self.aggregated_pin_data
                .as_ref()
                .and_then(|data| data.aggregated_stats.as_ref())
                .and_then(|stats| stats.saves)
        } else {
            Some(self.reaction_counts.values().sum())
        }
    }
}

/// `orig` when present, else the widest variant with a URL.
fn best_image(images: &HashMap<String, ImageVariant>) -> Option<&str> {
    images
        .get("orig")
        .or_else(|| images.get("originals"))
        .and_then(ImageVariant::usable_url)
        .or_else(|| {
            images
                .values()
                .filter(|variant| variant.usable_url().is_some())
                .max_by_key(|variant| variant.width.unwrap_or(0))
                .and_then(ImageVariant::usable_url)
        })
}

fn video_candidates(list: &VideoList) -> Vec<Rendition> {
    list.video_list
        .iter()
        .filter_map(|(label, variant)| {
            variant
                .url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| Rendition::new(label.as_str(), url))
        })
        .collect()
}

// ==================== PinterestExtractor ====================

/// Resolves Pinterest image, video, and story pins.
#[derive(Debug, Clone)]
pub struct PinterestExtractor {
    api_base: String,
    short_link_base: String,
}

impl Default for PinterestExtractor {
    fn default() -> Self {
        let endpoints = Endpoints::default();
        Self::with_base_urls(endpoints.pinterest_api, endpoints.pinterest_short)
    }
}

impl PinterestExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against custom API and short-link hosts (for testing with wiremock).
    #[must_use]
    pub fn with_base_urls(api_base: impl Into<String>, short_link_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            short_link_base: short_link_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Follows a `pin.it` short link and returns the pin URL it lands on.
    async fn expand_short_link(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<Url> {
        let short_url = format!("{}{}", self.short_link_base, url.path());
        let response = ctx
            .transport()
            .get(&short_url, &RequestOptions::new())
            .await?;
        debug!(landed = response.url(), "expanded pin.it short link");
        Ok(Url::parse(response.url())?)
    }
}

#[async_trait]
impl Extractor for PinterestExtractor {
    fn platform(&self) -> Platform {
        Platform::Pinterest
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let pin_url = if url.host_str() == Some(SHORT_LINK_HOST) {
            self.expand_short_link(url, ctx).await?
        } else {
            url.clone()
        };
        let Some(pin_id) = pin_id(&pin_url) else {
            return Err(ExtractError::parse(
                Platform::Pinterest,
                url.as_str(),
                "URL has no pin id (expected /pin/<id>/)",
            )
            .into());
        };

        let api_url = format!("{}/v3/pidgets/pins/info/?pin_ids={pin_id}", self.api_base);
        let response: PidgetsResponse = ctx
            .transport()
            .get(&api_url, &RequestOptions::new().header("Accept", "application/json"))
            .await?
            .json()?;
        if response.status != "success" {
            return Err(ExtractError::parse(
                Platform::Pinterest,
                url.as_str(),
                format!("pin API returned status '{}'", response.status),
            )
            .into());
        }
        let Some(pin) = response.data.into_iter().next() else {
            return Err(ExtractError::parse(
                Platform::Pinterest,
                url.as_str(),
                "pin API returned no data (pin may be deleted)",
            )
            .into());
        };

        let priority = ctx.quality().labels_for(Platform::Pinterest);
        let files = pin_files(&pin, &priority);
        if files.is_empty() && pin.videos.is_some() {
            return Err(ExtractError::parse(
                Platform::Pinterest,
                url.as_str(),
                "video pin offers only streaming manifests",
            )
            .into());
        }

        let total = files.len();
        let items = files
            .into_iter()
            .enumerate()
            .map(|(position, (media_type, file_url))| {
                build_item(
                    Platform::Pinterest,
                    media_type,
                    &file_url,
                    Some(pin_id),
                    carousel_index(total, position),
                    None,
                )
            })
            .collect::<Result<Vec<MediaItem>, _>>()?;

        let title = pin
            .title()
            .unwrap_or_else(|| format!("Pinterest pin {pin_id}"));
        let author = pin
            .pinner
            .as_ref()
            .and_then(|pinner| pinner.username.clone())
            .unwrap_or_else(|| "Pinterest".to_string());
        let meta = MediaMeta::new(Platform::Pinterest, title, author).with_likes(pin.likes());

        Ok(MediaResult::new(
            url.as_str(),
            items,
            headers(&[("Referer", REFERER)]),
            meta,
        )?)
    }
}

/// Files for a pin in presentation order: story blocks, else the video, else the image.
fn pin_files(pin: &Pin, priority: &[&str]) -> Vec<(MediaType, String)> {
    let story: Vec<(MediaType, String)> = pin
        .story_pin_data
        .iter()
        .flat_map(|story| story.pages.iter())
        .flat_map(|page| page.blocks.iter())
        .filter_map(|block| {
            if let Some(video) = &block.video
                && let Some(chosen) = select_rendition(&video_candidates(video), priority)
            {
                return Some((MediaType::Video, chosen.url.clone()));
            }
            block
                .image
                .as_ref()
                .and_then(|image| best_image(&image.images))
                .map(|url| (MediaType::Image, url.to_string()))
        })
        .collect();
    if !story.is_empty() {
        return story;
    }

    if let Some(videos) = &pin.videos {
        return select_rendition(&video_candidates(videos), priority)
            .map(|chosen| vec![(MediaType::Video, chosen.url.clone())])
            .unwrap_or_default();
    }

    best_image(&pin.images)
        .map(|url| vec![(MediaType::Image, url.to_string())])
        .unwrap_or_default()
}

/// Trailing digits of the segment after `/pin/` (`/pin/slug--12345/` → `12345`).
fn pin_id(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "pin")?;
    let segment = segments.next()?;
    let digits_start = segment
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(index, _)| index)?;
    Some(&segment[digits_start..])
}
