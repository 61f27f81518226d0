//! Reddit strategy: reads the post listing from the `.json` endpoint.
//!
//! Media comes in three shapes: galleries (`gallery_data` + `media_metadata`),
//! hosted video (`reddit_video`), and direct image links. Crossposts without
//! media of their own resolve through the parent post.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::filename::extension_from_url;
use crate::media::{MediaItem, MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Rendition, select_rendition};
use crate::transport::RequestOptions;

use super::{Endpoints, Extractor, build_item, carousel_index};

const SHORT_HOST: &str = "redd.it";

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "png", "gif", "webp"];

// ==================== Listing Types ====================

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct GalleryItem {
    media_id: String,
}

#[derive(Debug, Deserialize)]
struct GalleryData {
    #[serde(default)]
    items: Vec<GalleryItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataSource {
    u: Option<String>,
    gif: Option<String>,
    mp4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaMetadata {
    status: Option<String>,
    /// Kind tag: `Image` or `AnimatedImage`.
    e: Option<String>,
    /// Mime type, e.g. `image/png`.
    m: Option<String>,
    s: Option<MetadataSource>,
}

#[derive(Debug, Deserialize)]
struct RedditVideo {
    fallback_url: Option<String>,
    hls_url: Option<String>,
    dash_url: Option<String>,
}

impl RedditVideo {
    fn renditions(&self) -> Vec<Rendition> {
        [
            ("fallback", &self.fallback_url),
            ("hls", &self.hls_url),
            ("dash", &self.dash_url),
        ]
        .into_iter()
        .filter_map(|(label, url)| url.as_deref().map(|url| Rendition::new(label, url)))
        .collect()
    }
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct PreviewSource {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PreviewImage {
    source: PreviewSource,
}

#[derive(Debug, Deserialize)]
struct Preview {
    #[serde(default)]
    images: Vec<PreviewImage>,
    reddit_video_preview: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: Option<String>,
    title: Option<String>,
    author: Option<String>,
    url_overridden_by_dest: Option<String>,
    post_hint: Option<String>,
    #[serde(default)]
    is_gallery: bool,
    #[serde(default)]
    is_video: bool,
    gallery_data: Option<GalleryData>,
    media_metadata: Option<HashMap<String, MediaMetadata>>,
    secure_media: Option<MediaContainer>,
    media: Option<MediaContainer>,
    preview: Option<Preview>,
    view_count: Option<u64>,
    score: Option<i64>,
    #[serde(default)]
    crosspost_parent_list: Vec<Post>,
}

/// What kind of media a post carries, borrowed from the post.
enum PostMedia<'a> {
    Gallery(&'a GalleryData),
    Video(&'a RedditVideo),
    Image(&'a str),
}

impl Post {
    fn reddit_video(&self) -> Option<&RedditVideo> {
        [&self.secure_media, &self.media]
            .into_iter()
            .flatten()
            .find_map(|container| container.reddit_video.as_ref())
            .or_else(|| {
                self.preview
                    .as_ref()
                    .and_then(|preview| preview.reddit_video_preview.as_ref())
                    .filter(|_| self.is_video)
            })
    }

    fn direct_image(&self) -> Option<&str> {
        let dest = self.url_overridden_by_dest.as_deref();
        let is_image_link = self.post_hint.as_deref() == Some("image")
            || dest
                .and_then(extension_from_url)
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext));
        if is_image_link && let Some(dest) = dest {
            return Some(dest);
        }
        self.preview
            .as_ref()
            .and_then(|preview| preview.images.first())
            .map(|image| image.source.url.as_str())
    }

    fn media(&self) -> Option<PostMedia<'_>> {
        if self.is_gallery
            && let Some(gallery) = &self.gallery_data
        {
            return Some(PostMedia::Gallery(gallery));
        }
        if let Some(video) = self.reddit_video() {
            return Some(PostMedia::Video(video));
        }
        self.direct_image().map(PostMedia::Image)
    }
}

// ==================== RedditExtractor ====================

/// Resolves Reddit image, gallery, and hosted-video posts.
#[derive(Debug, Clone)]
pub struct RedditExtractor {
    base_url: String,
}

impl Default for RedditExtractor {
    fn default() -> Self {
        Self::with_base_url(Endpoints::default().reddit)
    }
}

impl RedditExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against a custom host (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn listing_url(&self, url: &Url) -> String {
        let path = if url.host_str() == Some(SHORT_HOST) {
            format!("/comments{}", url.path())
        } else {
            url.path().to_string()
        };
        format!(
            "{}{}.json?raw_json=1",
            self.base_url,
            path.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Extractor for RedditExtractor {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let listings: Vec<Listing> = ctx
            .transport()
            .get(
                &self.listing_url(url),
                &RequestOptions::new().header("Accept", "application/json"),
            )
            .await?
            .json()?;
        let Some(post) = listings
            .into_iter()
            .next()
            .and_then(|listing| listing.data.children.into_iter().next())
            .map(|child| child.data)
        else {
            return Err(
                ExtractError::parse(Platform::Reddit, url.as_str(), "listing has no post").into(),
            );
        };

        let source = if post.media().is_none()
            && let Some(parent) = post.crosspost_parent_list.first()
        {
            debug!("using crosspost parent media");
            parent
        } else {
            &post
        };

        let id = source.id.as_deref().or(post.id.as_deref());
        let items = match source.media() {
            Some(PostMedia::Gallery(gallery)) => gallery_items(source, gallery, id)?,
            Some(PostMedia::Video(video)) => {
                let priority = ctx.quality().labels_for(Platform::Reddit);
                let renditions = video.renditions();
                let Some(chosen) = select_rendition(&renditions, &priority) else {
                    return Err(ExtractError::parse(
                        Platform::Reddit,
                        url.as_str(),
                        "video offers only streaming manifests",
                    )
                    .into());
                };
                vec![build_item(
                    Platform::Reddit,
                    MediaType::Video,
                    &chosen.url,
                    id,
                    None,
                    None,
                )?]
            }
            Some(PostMedia::Image(image)) => vec![build_item(
                Platform::Reddit,
                MediaType::Image,
                image,
                id,
                None,
                None,
            )?],
            None => {
                return Err(ExtractError::parse(
                    Platform::Reddit,
                    url.as_str(),
                    "post has no image, gallery, or hosted video (text or external link post)",
                )
                .into());
            }
        };

        let meta = MediaMeta::new(
            Platform::Reddit,
            post.title.clone().unwrap_or_default(),
            post.author.clone().unwrap_or_else(|| "[deleted]".to_string()),
        )
        .with_views(post.view_count)
        .with_likes(post.score.and_then(|score| u64::try_from(score).ok()));

        Ok(MediaResult::new(url.as_str(), items, BTreeMap::new(), meta)?)
    }
}

/// Gallery items in `gallery_data` order; entries without a usable URL are skipped.
fn gallery_items(
    post: &Post,
    gallery: &GalleryData,
    id: Option<&str>,
) -> anyhow::Result<Vec<MediaItem>> {
    let metadata = post.media_metadata.as_ref();
    let files: Vec<(MediaType, &str, Option<&str>)> = gallery
        .items
        .iter()
        .filter_map(|entry| metadata?.get(&entry.media_id))
        .filter(|meta| meta.status.as_deref() == Some("valid"))
        .filter_map(|meta| {
            let source = meta.s.as_ref()?;
            let mime = meta.m.as_deref();
            if meta.e.as_deref() == Some("AnimatedImage") {
                source
                    .mp4
                    .as_deref()
                    .map(|url| (MediaType::Video, url, Some("video/mp4")))
                    .or_else(|| source.gif.as_deref().map(|url| (MediaType::Image, url, mime)))
            } else {
                source.u.as_deref().map(|url| (MediaType::Image, url, mime))
            }
        })
        .collect();

    let total = files.len();
    Ok(files
        .into_iter()
        .enumerate()
        .map(|(position, (media_type, url, mime))| {
            build_item(
                Platform::Reddit,
                media_type,
                url,
                id,
                carousel_index(total, position),
                mime,
            )
        })
        .collect::<Result<Vec<_>, _>>()?)
}
