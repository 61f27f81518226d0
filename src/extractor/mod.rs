//! Platform extraction strategies.
//!
//! Each strategy turns one post URL into a [`MediaResult`] for its platform.
//! Strategies are written with `anyhow` internally and never build
//! [`ExtractError`] values by hand unless they want a specific kind; the
//! [`run_extractor`] boundary normalizes everything else.
//!
//! # Architecture
//!
//! - [`Extractor`] - Async trait every platform implements
//! - [`Endpoints`] - Upstream base URLs, overridable for tests and mirrors
//! - [`run_extractor`] - Strategy boundary: panic capture and error normalization
//! - [`FacebookExtractor`] - HTML marker scraping for `playable_url` variants
//! - [`InstagramExtractor`] - Embed page JSON, including sidecar carousels
//! - [`PinterestExtractor`] - Pidgets API, video lists, story pins, `pin.it` links
//! - [`RedditExtractor`] - `.json` listing API, galleries, `reddit_video`
//! - [`TikTokExtractor`] - Short-video API with concurrent oEmbed metadata
//! - [`TwitterExtractor`] - Mirror API with bitrate-ranked variants
//! - [`VimeoExtractor`] - Player config progressive files
//! - [`YouTubeExtractor`] - Cookie-primed conversion mirror

mod facebook;
mod instagram;
mod pinterest;
mod reddit;
pub(crate) mod scrape;
mod tiktok;
mod twitter;
mod vimeo;
mod youtube;

pub use facebook::FacebookExtractor;
pub use instagram::InstagramExtractor;
pub use pinterest::PinterestExtractor;
pub use reddit::RedditExtractor;
pub use tiktok::TikTokExtractor;
pub use twitter::TwitterExtractor;
pub use vimeo::VimeoExtractor;
pub use youtube::YouTubeExtractor;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::debug;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::filename::{infer_extension, media_filename};
use crate::media::{InvalidMediaItem, MediaItem, MediaResult, MediaType};
use crate::platform::Platform;

/// A platform-specific extraction strategy.
///
/// Implementations are stateless apart from their endpoint configuration and
/// must be safe to share across concurrent resolutions.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// The platform this strategy serves; used to tag failures.
    fn platform(&self) -> Platform;

    /// Resolves `url` into a normalized media record.
    ///
    /// Errors may be any type; the boundary maps non-[`ExtractError`] failures
    /// to [`ExtractError::Parse`] tagged with [`platform`](Self::platform).
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult>;
}

/// Upstream base URLs used by the default strategies.
///
/// Each value is a scheme + host (+ optional path prefix) without a trailing
/// slash. Override them to point strategies at mock servers or self-hosted
/// mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub facebook: String,
    pub instagram: String,
    pub pinterest_api: String,
    /// Base used to expand `pin.it` short links.
    pub pinterest_short: String,
    pub reddit: String,
    pub tiktok_api: String,
    pub tiktok_oembed: String,
    pub twitter_api: String,
    pub vimeo_player: String,
    pub youtube_mirror: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            facebook: "https://www.facebook.com".to_string(),
            instagram: "https://www.instagram.com".to_string(),
            pinterest_api: "https://widgets.pinterest.com".to_string(),
            pinterest_short: "https://pin.it".to_string(),
            reddit: "https://www.reddit.com".to_string(),
            tiktok_api: "https://www.tikwm.com".to_string(),
            tiktok_oembed: "https://www.tiktok.com".to_string(),
            twitter_api: "https://api.fxtwitter.com".to_string(),
            vimeo_player: "https://player.vimeo.com".to_string(),
            youtube_mirror: "https://www.y2mate.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every upstream at the same base URL.
    #[must_use]
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            facebook: base.clone(),
            instagram: base.clone(),
            pinterest_api: base.clone(),
            pinterest_short: base.clone(),
            reddit: base.clone(),
            tiktok_api: base.clone(),
            tiktok_oembed: base.clone(),
            twitter_api: base.clone(),
            vimeo_player: base.clone(),
            youtube_mirror: base,
        }
    }
}

/// Runs a strategy and normalizes every failure into [`ExtractError`].
///
/// - a panic inside the strategy becomes `Parse` tagged with its platform;
/// - an [`ExtractError`] passes through, and an untagged `Parse` gains the
///   platform;
/// - any other error becomes `Parse` tagged with the platform, keeping the
///   full context chain as the reason.
///
/// # Errors
///
/// Returns the normalized [`ExtractError`].
pub async fn run_extractor(
    extractor: &dyn Extractor,
    url: &Url,
    ctx: &ResolveContext,
) -> Result<MediaResult, ExtractError> {
    let platform = extractor.platform();
    match AssertUnwindSafe(extractor.extract(url, ctx))
        .catch_unwind()
        .await
    {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(normalize_error(platform, url.as_str(), error)),
        Err(panic) => {
            let message = panic_message(&*panic);
            debug!(platform = platform.name(), message, "strategy panicked");
            Err(ExtractError::parse(
                platform,
                url.as_str(),
                format!("strategy panicked: {message}"),
            ))
        }
    }
}

fn normalize_error(platform: Platform, url: &str, error: anyhow::Error) -> ExtractError {
    match error.downcast::<ExtractError>() {
        Ok(ExtractError::Parse {
            platform: None,
            url,
            reason,
        }) => ExtractError::Parse {
            platform: Some(platform),
            url,
            reason,
        },
        Ok(error) => error,
        Err(other) => ExtractError::parse(platform, url, format!("{other:#}")),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Builds one item with a synthesized filename.
///
/// `index` is the 1-based carousel position, `None` for single-item posts.
pub(crate) fn build_item(
    platform: Platform,
    media_type: MediaType,
    url: &str,
    id: Option<&str>,
    index: Option<usize>,
    content_type: Option<&str>,
) -> Result<MediaItem, InvalidMediaItem> {
    let extension = infer_extension(url, content_type, media_type);
    MediaItem::new(media_type, url, media_filename(platform, id, index, &extension))
}

/// 1-based position for carousel filenames; `None` when the post has one item.
pub(crate) fn carousel_index(total: usize, position: usize) -> Option<usize> {
    (total > 1).then_some(position + 1)
}

pub(crate) fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}
