//! Instagram strategy: reads the post's media node from the public embed page.
//!
//! The embed page carries the `shortcode_media` object either inside a
//! `<script type="application/json">` blob or as an escaped JSON string after
//! `"contextJSON":"`. Both are tried in that order.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaItem, MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::transport::RequestOptions;

use super::scrape::{find_object, json_string_after, script_json_blobs, short_title};
use super::{Endpoints, Extractor, build_item, carousel_index, headers};

const MEDIA_KEYS: [&str; 2] = ["shortcode_media", "xdt_shortcode_media"];

const CONTEXT_JSON_MARKER: &str = r#""contextJSON":""#;

const POST_PATH_KINDS: [&str; 4] = ["p", "reel", "reels", "tv"];

const REFERER: &str = "https://www.instagram.com/";

const TITLE_MAX_CHARS: usize = 80;

// ==================== Embed Page Types ====================

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Edges<T> {
    #[serde(default)]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct CaptionNode {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Owner {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Count {
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DisplayResource {
    src: String,
    #[serde(default)]
    config_width: u32,
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    #[serde(rename = "__typename", default)]
    typename: String,
    display_url: Option<String>,
    #[serde(default)]
    display_resources: Vec<DisplayResource>,
    video_url: Option<String>,
    video_view_count: Option<u64>,
    edge_sidecar_to_children: Option<Edges<MediaNode>>,
    edge_media_to_caption: Option<Edges<CaptionNode>>,
    owner: Option<Owner>,
    edge_media_preview_like: Option<Count>,
    edge_liked_by: Option<Count>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Image,
    Video,
    Sidecar,
}

impl MediaNode {
    fn kind(&self) -> NodeKind {
        match self.typename.trim_start_matches("XDT") {
            "GraphSidecar" => NodeKind::Sidecar,
            "GraphVideo" => NodeKind::Video,
            "GraphImage" => NodeKind::Image,
            _ if self.edge_sidecar_to_children.is_some() => NodeKind::Sidecar,
            _ if self.video_url.is_some() => NodeKind::Video,
            _ => NodeKind::Image,
        }
    }

    /// Widest non-empty display resource, else `display_url`.
    fn image_url(&self) -> Option<&str> {
        self.display_resources
            .iter()
            .filter(|resource| !resource.src.is_empty())
            .max_by_key(|resource| resource.config_width)
            .map(|resource| resource.src.as_str())
            .or_else(|| self.display_url.as_deref().filter(|url| !url.is_empty()))
    }

    /// The downloadable file for a single (non-sidecar) node.
    fn media(&self) -> Option<(MediaType, &str)> {
        match self.kind() {
            NodeKind::Video => self
                .video_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map(|url| (MediaType::Video, url)),
            NodeKind::Image => self.image_url().map(|url| (MediaType::Image, url)),
            NodeKind::Sidecar => None,
        }
    }

    fn caption(&self) -> Option<&str> {
        self.edge_media_to_caption
            .as_ref()?
            .edges
            .first()
            .map(|edge| edge.node.text.as_str())
    }

    fn likes(&self) -> Option<u64> {
        self.edge_media_preview_like
            .as_ref()
            .and_then(|count| count.count)
            .or_else(|| self.edge_liked_by.as_ref().and_then(|count| count.count))
    }
}

// ==================== InstagramExtractor ====================

/// Resolves Instagram posts, reels, and sidecar carousels.
#[derive(Debug, Clone)]
pub struct InstagramExtractor {
    base_url: String,
}

impl Default for InstagramExtractor {
    fn default() -> Self {
        Self::with_base_url(Endpoints::default().instagram)
    }
}

impl InstagramExtractor {
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
}

#[async_trait]
impl Extractor for InstagramExtractor {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let Some(code) = shortcode(url) else {
            return Err(ExtractError::parse(
                Platform::Instagram,
                url.as_str(),
                "URL has no post shortcode (expected /p/, /reel/, or /tv/)",
            )
            .into());
        };

        let embed_url = format!("{}/p/{code}/embed/captioned/", self.base_url);
        let response = ctx
            .transport()
            .get(&embed_url, &RequestOptions::new().header("Referer", REFERER))
            .await?;

        let Some(node) = locate_media_node(response.text()) else {
            return Err(ExtractError::parse(
                Platform::Instagram,
                url.as_str(),
                "embed page has no media data (post may be private or removed)",
            )
            .into());
        };
        let node: MediaNode = serde_json::from_value(node)?;
        debug!(kind = ?node.kind(), "instagram media node located");

        let items = collect_items(&node, code)?;
        let title = node
            .caption()
            .and_then(|caption| short_title(caption, TITLE_MAX_CHARS))
            .unwrap_or_else(|| format!("Instagram post {code}"));
        let author = node
            .owner
            .as_ref()
            .and_then(|owner| owner.username.clone())
            .unwrap_or_else(|| "Instagram".to_string());
        let meta = MediaMeta::new(Platform::Instagram, title, author)
            .with_views(node.video_view_count)
            .with_likes(node.likes());

        Ok(MediaResult::new(
            url.as_str(),
            items,
            headers(&[("Referer", REFERER)]),
            meta,
        )?)
    }
}

fn collect_items(node: &MediaNode, code: &str) -> anyhow::Result<Vec<MediaItem>> {
    let files: Vec<(MediaType, &str)> = if node.kind() == NodeKind::Sidecar {
        node.edge_sidecar_to_children
            .iter()
            .flat_map(|children| children.edges.iter())
            .filter_map(|edge| edge.node.media())
            .collect()
    } else {
        node.media().into_iter().collect()
    };

    let total = files.len();
    files
        .into_iter()
        .enumerate()
        .map(|(position, (media_type, url))| {
            build_item(
                Platform::Instagram,
                media_type,
                url,
                Some(code),
                carousel_index(total, position),
                None,
            )
            .map_err(Into::into)
        })
        .collect()
}

/// Extracts the shortcode from `/p/<code>`, `/reel/<code>`, `/reels/<code>`, or `/tv/<code>`,
/// optionally preceded by a username segment.
fn shortcode(url: &Url) -> Option<&str> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    segments
        .windows(2)
        .find(|pair| POST_PATH_KINDS.contains(&pair[0]))
        .map(|pair| pair[1])
        .filter(|code| code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

fn locate_media_node(html: &str) -> Option<Value> {
    let from_scripts = script_json_blobs(html).into_iter().find_map(|blob| {
        let value: Value = serde_json::from_str(blob).ok()?;
        find_object(&value, &MEDIA_KEYS).cloned()
    });
    if from_scripts.is_some() {
        return from_scripts;
    }

    let context = json_string_after(html, CONTEXT_JSON_MARKER)?;
    let value: Value = serde_json::from_str(&context).ok()?;
    value
        .pointer("/gql_data/shortcode_media")
        .filter(|node| node.is_object())
        .or_else(|| find_object(&value, &MEDIA_KEYS))
        .cloned()
}
