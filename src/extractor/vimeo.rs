//! Vimeo strategy reading the embeddable player's config document.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Rendition, select_rendition};
use crate::transport::RequestOptions;

use super::{Endpoints, Extractor, build_item, headers};

const REFERER: &str = "https://vimeo.com/";

const UNLISTED_HASH_LEN: usize = 10;

#[derive(Debug, Deserialize)]
struct PlayerConfig {
    request: Option<ConfigRequest>,
    video: Option<ConfigVideo>,
}

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    files: Option<ConfigFiles>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFiles {
    #[serde(default)]
    progressive: Vec<ProgressiveFile>,
    hls: Option<StreamingFiles>,
}

#[derive(Debug, Deserialize)]
struct ProgressiveFile {
    url: String,
    #[serde(default)]
    quality: String,
    mime: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamingFiles {
    default_cdn: Option<String>,
    #[serde(default)]
    cdns: std::collections::BTreeMap<String, StreamingCdn>,
}

#[derive(Debug, Deserialize)]
struct StreamingCdn {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigVideo {
    id: Option<u64>,
    title: Option<String>,
    owner: Option<ConfigOwner>,
}

#[derive(Debug, Deserialize)]
struct ConfigOwner {
    name: Option<String>,
}

impl ConfigFiles {
    /// Progressive files first, then the default CDN's playlist so selection can see it.
    fn renditions(&self) -> Vec<Rendition> {
        let mut renditions: Vec<Rendition> = self
            .progressive
            .iter()
            .map(|file| Rendition::new(file.quality.clone(), file.url.clone()))
            .collect();
        if let Some(hls) = &self.hls {
            let cdn = hls
                .default_cdn
                .as_ref()
                .and_then(|name| hls.cdns.get(name))
                .or_else(|| hls.cdns.values().next());
            if let Some(url) = cdn.and_then(|cdn| cdn.url.clone()) {
                renditions.push(Rendition::new("hls", url));
            }
        }
        renditions
    }

    fn mime_for(&self, url: &str) -> Option<&str> {
        self.progressive
            .iter()
            .find(|file| file.url == url)
            .and_then(|file| file.mime.as_deref())
    }
}

/// Resolves public and unlisted Vimeo videos.
#[derive(Debug, Clone)]
pub struct VimeoExtractor {
    player_base: String,
}

impl Default for VimeoExtractor {
    fn default() -> Self {
        Self::with_base_url(Endpoints::default().vimeo_player)
    }
}

impl VimeoExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against a custom player host (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(player_base: impl Into<String>) -> Self {
        Self {
            player_base: player_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn config_url(&self, video: &VideoRef) -> String {
        let mut config_url = format!("{}/video/{}/config", self.player_base, video.id);
        if let Some(hash) = &video.unlisted_hash {
            config_url.push_str("?h=");
            config_url.push_str(&urlencoding::encode(hash));
        }
        config_url
    }
}

#[async_trait]
impl Extractor for VimeoExtractor {
    fn platform(&self) -> Platform {
        Platform::Vimeo
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let Some(video) = video_ref(url) else {
            return Err(ExtractError::parse(
                Platform::Vimeo,
                url.as_str(),
                "URL has no numeric video id",
            )
            .into());
        };

        let config: PlayerConfig = ctx
            .transport()
            .get(
                &self.config_url(&video),
                &RequestOptions::new().header("Referer", REFERER),
            )
            .await?
            .json()?;

        let files = config
            .request
            .and_then(|request| request.files)
            .unwrap_or_default();
        let renditions = files.renditions();
        let labels = ctx.quality().labels_for(Platform::Vimeo);
        let Some(chosen) = select_rendition(&renditions, &labels) else {
            let reason = if renditions.is_empty() {
                "player config lists no video files"
            } else {
                "only streaming playlists available (no progressive file)"
            };
            return Err(ExtractError::parse(Platform::Vimeo, url.as_str(), reason).into());
        };

        let id = config
            .video
            .as_ref()
            .and_then(|meta| meta.id)
            .map_or_else(|| video.id.clone(), |id| id.to_string());
        let item = build_item(
            Platform::Vimeo,
            MediaType::Video,
            &chosen.url,
            Some(&id),
            None,
            files.mime_for(&chosen.url),
        )?
        .with_header("Referer", REFERER);

        let title = config
            .video
            .as_ref()
            .and_then(|meta| meta.title.clone())
            .unwrap_or_else(|| format!("Vimeo {id}"));
        let author = config
            .video
            .as_ref()
            .and_then(|meta| meta.owner.as_ref())
            .and_then(|owner| owner.name.clone())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(MediaResult::new(
            url.as_str(),
            vec![item],
            headers(&[("Referer", REFERER)]),
            MediaMeta::new(Platform::Vimeo, title, author),
        )?)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct VideoRef {
    id: String,
    unlisted_hash: Option<String>,
}

/// Finds the numeric id in `vimeo.com/<id>`, `/channels/<c>/<id>`,
/// `player.vimeo.com/video/<id>`, and the unlisted `vimeo.com/<id>/<hash>` form.
fn video_ref(url: &Url) -> Option<VideoRef> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let position = segments
        .iter()
        .position(|segment| segment.chars().all(|c| c.is_ascii_digit()))?;
    let hash = segments
        .get(position + 1)
        .filter(|segment| is_unlisted_hash(segment))
        .map(|segment| (*segment).to_string())
        .or_else(|| {
            url.query_pairs()
                .find(|(key, _)| key == "h")
                .map(|(_, value)| value.into_owned())
        });
    Some(VideoRef {
        id: segments[position].to_string(),
        unlisted_hash: hash,
    })
}

/// Unlisted-link hashes are ten lowercase hex digits.
fn is_unlisted_hash(segment: &str) -> bool {
    segment.len() == UNLISTED_HASH_LEN
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::ResolveOptions;
    use crate::extractor::run_extractor;
    use crate::quality::Quality;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn config_body() -> serde_json::Value {
        serde_json::json!({
            "request": {"files": {
                "progressive": [
                    {"quality": "360p", "url": "https://vod.example.com/360.mp4", "mime": "video/mp4"},
                    {"quality": "1080p", "url": "https://vod.example.com/1080.mp4", "mime": "video/mp4"},
                    {"quality": "720p", "url": "https://vod.example.com/720.mp4", "mime": "video/mp4"}
                ],
                "hls": {"default_cdn": "akamai", "cdns": {"akamai": {"url": "https://hls.example.com/master.m3u8"}}}
            }},
            "video": {"id": 76979871, "title": "The New Vimeo Player", "owner": {"name": "Vimeo Staff"}}
        })
    }

    #[test]
    fn test_video_ref_forms() {
        let parse = |raw: &str| video_ref(&Url::parse(raw).unwrap());
        assert_eq!(parse("https://vimeo.com/76979871").unwrap().id, "76979871");
        assert_eq!(
            parse("https://vimeo.com/channels/staffpicks/76979871").unwrap().id,
            "76979871"
        );
        assert_eq!(
            parse("https://player.vimeo.com/video/76979871?h=ab12").unwrap(),
            VideoRef {
                id: "76979871".to_string(),
                unlisted_hash: Some("ab12".to_string()),
            }
        );
        assert_eq!(
            parse("https://vimeo.com/76979871/8272103f6e").unwrap().unlisted_hash,
            Some("8272103f6e".to_string())
        );
        assert!(parse("https://vimeo.com/staffpicks").is_none());
        assert_eq!(parse("https://vimeo.com/123/abc").unwrap().unlisted_hash, None);
        assert_eq!(parse("https://vimeo.com/123/8272103f6e12").unwrap().unlisted_hash, None);
    }

    #[test]
    fn test_config_url_encodes_query_hash() {
        let extractor = VimeoExtractor::with_base_url("https://player.example.com/");
        let video = VideoRef {
            id: "42".to_string(),
            unlisted_hash: Some("a&b c".to_string()),
        };
        assert_eq!(
            extractor.config_url(&video),
            "https://player.example.com/video/42/config?h=a%26b%20c"
        );
    }

    #[tokio::test]
    async fn test_progressive_selection_follows_quality() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/video/76979871/config"))
            .and(header("Referer", REFERER))
            .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
            .mount(&server)
            .await;

        let extractor = VimeoExtractor::with_base_url(server.uri());
        let url = Url::parse("https://vimeo.com/76979871").unwrap();

        let ctx = ResolveContext::new(ResolveOptions::default()).unwrap();
        let best = extractor.extract(&url, &ctx).await.unwrap();
        assert_eq!(best.urls()[0].url(), "https://vod.example.com/1080.mp4");
        assert_eq!(best.urls()[0].filename(), "vimeo_76979871.mp4");
        assert_eq!(best.urls()[0].headers().get("Referer").unwrap(), REFERER);
        assert_eq!(best.meta().title, "The New Vimeo Player");
        assert_eq!(best.meta().author, "Vimeo Staff");

        let ctx = ResolveContext::new(ResolveOptions::default().with_quality(Quality::Medium)).unwrap();
        let medium = extractor.extract(&url, &ctx).await.unwrap();
        assert_eq!(medium.urls()[0].url(), "https://vod.example.com/720.mp4");
    }

    #[tokio::test]
    async fn test_unlisted_hash_is_forwarded() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/video/76979871/config"))
            .and(query_param("h", "8272103f6e"))
            .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
            .mount(&server)
            .await;

        let extractor = VimeoExtractor::with_base_url(server.uri());
        let url = Url::parse("https://vimeo.com/76979871/8272103f6e").unwrap();
        let ctx = ResolveContext::new(ResolveOptions::default()).unwrap();
        assert!(extractor.extract(&url, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_streaming_only_config_is_parse_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/video/5/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request": {"files": {"progressive": [],
                    "hls": {"cdns": {"fastly": {"url": "https://hls.example.com/master.m3u8"}}}}},
                "video": {"id": 5, "title": "Live only"}
            })))
            .mount(&server)
            .await;

        let extractor = VimeoExtractor::with_base_url(server.uri());
        let url = Url::parse("https://vimeo.com/5").unwrap();
        let ctx = ResolveContext::new(ResolveOptions::default()).unwrap();
        let err = run_extractor(&extractor, &url, &ctx).await.unwrap_err();
        match err {
            ExtractError::Parse { platform, reason, .. } => {
                assert_eq!(platform, Some(Platform::Vimeo));
                assert!(reason.contains("streaming"), "{reason}");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_private_video_is_network_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let extractor = VimeoExtractor::with_base_url(server.uri());
        let url = Url::parse("https://vimeo.com/6").unwrap();
        let ctx = ResolveContext::new(ResolveOptions::default()).unwrap();
        let err = run_extractor(&extractor, &url, &ctx).await.unwrap_err();
        assert!(matches!(err, ExtractError::Network { status: Some(403), .. }));
    }
}
