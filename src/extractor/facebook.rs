//! Facebook strategy: scrapes video URLs out of the post page HTML.
//!
//! The page embeds its player configuration as escaped JS strings. We search
//! for a fixed set of HD and SD markers, unescape whatever follows, and fall
//! back to the `og:image` preview for photo posts.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Rendition, select_rendition};
use crate::transport::RequestOptions;

use super::scrape::{between, compile_static_regex, html_title, meta_content, unescape_js};
use super::{Endpoints, Extractor, build_item, headers};

const HD_MARKERS: [&str; 3] = [
    r#""browser_native_hd_url":""#,
    r#""playable_url_quality_hd":""#,
    r#"hd_src:""#,
];

const SD_MARKERS: [&str; 3] = [
    r#""browser_native_sd_url":""#,
    r#""playable_url":""#,
    r#"sd_src:""#,
];

const OWNER_MARKER: &str = r#""owner":{"__typename":"User","name":""#;

const VIDEO_ID_MARKER: &str = r#""video_id":""#;

const REFERER: &str = "https://www.facebook.com/";

static PATH_VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/(?:videos|reel|reels)/(?:[^/]+/)?(\d+)"));

/// Resolves Facebook video, reel, and photo posts.
#[derive(Debug, Clone)]
pub struct FacebookExtractor {
    base_url: String,
}

impl Default for FacebookExtractor {
    fn default() -> Self {
        Self::with_base_url(Endpoints::default().facebook)
    }
}

impl FacebookExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against a custom page host (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The page to fetch: `fb.watch` links as given, everything else on the configured host.
    fn page_url(&self, url: &Url) -> String {
        if url.host_str() == Some("fb.watch") {
            return url.to_string();
        }
        match url.query() {
            Some(query) => format!("{}{}?{query}", self.base_url, url.path()),
            None => format!("{}{}", self.base_url, url.path()),
        }
    }
}

#[async_trait]
impl Extractor for FacebookExtractor {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let request = RequestOptions::new()
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none");
        let response = ctx.transport().get(&self.page_url(url), &request).await?;
        let html = response.text();

        let renditions = collect_renditions(html);
        debug!(candidates = renditions.len(), "facebook renditions found");
        let priority = ctx.quality().labels_for(Platform::Facebook);
        let id = video_id(url, html);

        let item = if let Some(chosen) = select_rendition(&renditions, &priority) {
            build_item(
                Platform::Facebook,
                MediaType::Video,
                &chosen.url,
                id.as_deref(),
                None,
                None,
            )?
        } else if let Some(image) = meta_content(html, "og:image") {
            build_item(
                Platform::Facebook,
                MediaType::Image,
                &image,
                id.as_deref(),
                None,
                None,
            )?
        } else {
            return Err(ExtractError::parse(
                Platform::Facebook,
                url.as_str(),
                "no playable video or preview image in page (post may require login)",
            )
            .into());
        };

        let title = meta_content(html, "og:title")
            .or_else(|| html_title(html))
            .unwrap_or_else(|| "Facebook video".to_string());
        let author = between(html, OWNER_MARKER, "\"")
            .map(unescape_js)
            .unwrap_or_else(|| "Facebook".to_string());

        Ok(MediaResult::new(
            url.as_str(),
            vec![item],
            headers(&[("Referer", REFERER)]),
            MediaMeta::new(Platform::Facebook, title, author),
        )?)
    }
}

/// HD candidates first, then SD, each in marker order.
fn collect_renditions(html: &str) -> Vec<Rendition> {
    let capture = |label: &'static str, markers: &[&str]| -> Vec<Rendition> {
        markers
            .iter()
            .filter_map(|marker| between(html, marker, "\""))
            .map(|raw| Rendition::new(label, unescape_js(raw)))
            .collect()
    };
    let mut renditions = capture("hd", &HD_MARKERS);
    renditions.extend(capture("sd", &SD_MARKERS));
    renditions
}

fn video_id(url: &Url, html: &str) -> Option<String> {
    if let Some(caps) = PATH_VIDEO_ID_RE.captures(url.path()) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    if let Some((_, value)) = url
        .query_pairs()
        .find(|(key, value)| matches!(key.as_ref(), "v" | "story_fbid" | "fbid") && !value.is_empty())
    {
        return Some(value.into_owned());
    }
    between(html, VIDEO_ID_MARKER, "\"")
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::ResolveOptions;
    use crate::extractor::run_extractor;
    use crate::quality::Quality;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VIDEO_PAGE: &str = r#"<html><head>
        <meta property="og:title" content="Sunset timelapse" />
        <title>Facebook</title></head><body><script>
        {"video_id":"998877","owner":{"__typename":"User","name":"Jane Doe"},
         "browser_native_hd_url":"https:\/\/video.fbcdn.net\/v\/hd.mp4?oh=1&amp;oe=2",
         "browser_native_sd_url":"https:\/\/video.fbcdn.net\/v\/sd.mp4?oh=3"}
        </script></body></html>"#;

    async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(page_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn context(quality: Quality) -> ResolveContext {
        ResolveContext::new(ResolveOptions::new().with_quality(quality)).unwrap()
    }

    #[test]
    fn test_video_id_sources() {
        let url = Url::parse("https://www.facebook.com/jane/videos/123456/").unwrap();
        assert_eq!(video_id(&url, "").unwrap(), "123456");
        let url = Url::parse("https://www.facebook.com/watch/?v=42").unwrap();
        assert_eq!(video_id(&url, "").unwrap(), "42");
        let url = Url::parse("https://www.facebook.com/photo/?fbid=77&set=a.1").unwrap();
        assert_eq!(video_id(&url, "").unwrap(), "77");
        let url = Url::parse("https://www.facebook.com/share/v/abc/").unwrap();
        assert_eq!(video_id(&url, VIDEO_PAGE).unwrap(), "998877");
        assert!(video_id(&url, "").is_none());
    }

    #[tokio::test]
    async fn test_best_quality_picks_hd_and_reads_meta() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_page(&server, "/jane/videos/998877/", VIDEO_PAGE).await;

        let extractor = FacebookExtractor::with_base_url(server.uri());
        let url = Url::parse("https://www.facebook.com/jane/videos/998877/").unwrap();
        let result = extractor.extract(&url, &context(Quality::Best)).await.unwrap();

        let item = &result.urls()[0];
        assert_eq!(item.url(), "https://video.fbcdn.net/v/hd.mp4?oh=1&oe=2");
        assert_eq!(item.media_type(), MediaType::Video);
        assert_eq!(item.filename(), "facebook_998877.mp4");
        assert_eq!(result.meta().title, "Sunset timelapse");
        assert_eq!(result.meta().author, "Jane Doe");
        assert_eq!(result.headers().get("Referer").unwrap(), REFERER);
    }

    #[tokio::test]
    async fn test_low_quality_prefers_sd() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_page(&server, "/reel/998877", VIDEO_PAGE).await;

        let extractor = FacebookExtractor::with_base_url(server.uri());
        let url = Url::parse("https://m.facebook.com/reel/998877").unwrap();
        let result = extractor.extract(&url, &context(Quality::Low)).await.unwrap();
        assert_eq!(result.urls()[0].url(), "https://video.fbcdn.net/v/sd.mp4?oh=3");
    }

    #[tokio::test]
    async fn test_manifest_hd_falls_back_to_direct_sd() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let page = r#""playable_url_quality_hd":"https:\/\/video.fbcdn.net\/hd\/master.m3u8","playable_url":"https:\/\/video.fbcdn.net\/sd.mp4""#;
        mount_page(&server, "/watch/", page).await;

        let extractor = FacebookExtractor::with_base_url(server.uri());
        let url = Url::parse("https://www.facebook.com/watch/?v=5").unwrap();
        let result = extractor.extract(&url, &context(Quality::Best)).await.unwrap();
        assert_eq!(result.urls()[0].url(), "https://video.fbcdn.net/sd.mp4");
        assert_eq!(result.urls()[0].filename(), "facebook_5.mp4");
    }

    #[tokio::test]
    async fn test_photo_post_uses_og_image() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let page = r#"<meta property="og:image" content="https://scontent.fbcdn.net/p/photo.jpg?a=1&amp;b=2">"#;
        mount_page(&server, "/photo/", page).await;

        let extractor = FacebookExtractor::with_base_url(server.uri());
        let url = Url::parse("https://www.facebook.com/photo/?fbid=77").unwrap();
        let result = extractor.extract(&url, &context(Quality::Best)).await.unwrap();
        let item = &result.urls()[0];
        assert_eq!(item.media_type(), MediaType::Image);
        assert_eq!(item.url(), "https://scontent.fbcdn.net/p/photo.jpg?a=1&b=2");
        assert_eq!(item.filename(), "facebook_77.jpg");
        assert_eq!(result.meta().author, "Facebook");
    }

    #[tokio::test]
    async fn test_login_wall_is_tagged_parse_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_page(&server, "/private/videos/1/", "<html><title>Log in</title></html>").await;

        let extractor = FacebookExtractor::with_base_url(server.uri());
        let url = Url::parse("https://www.facebook.com/private/videos/1/").unwrap();
        let err = run_extractor(&extractor, &url, &context(Quality::Best))
            .await
            .unwrap_err();
        assert_eq!(err.platform(), Some(Platform::Facebook));
    }
}
