//! YouTube strategy backed by a conversion mirror.
//!
//! The mirror needs a session cookie from its landing page, then answers a
//! search call with the available formats and a convert call with the direct
//! link for one format key. Formats are tried in quality order until one
//! converts to a direct file.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::context::ResolveContext;
use crate::error::ExtractError;
use crate::media::{MediaMeta, MediaResult, MediaType};
use crate::platform::Platform;
use crate::quality::{Quality, is_manifest};
use crate::retry::{RetryPolicy, with_retry};
use crate::transport::{RequestBody, RequestOptions, Response};

use super::{Endpoints, Extractor, build_item};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    mess: String,
    vid: Option<String>,
    title: Option<String>,
    /// Channel name.
    a: Option<String>,
    #[serde(default)]
    links: SearchLinks,
}

#[derive(Debug, Default, Deserialize)]
struct SearchLinks {
    #[serde(default)]
    mp4: BTreeMap<String, FormatLink>,
    #[serde(default)]
    mp3: BTreeMap<String, FormatLink>,
}

#[derive(Debug, Clone, Deserialize)]
struct FormatLink {
    /// Quality label such as `720p` or `128kbps`.
    #[serde(default)]
    q: String,
    /// Container extension.
    f: Option<String>,
    /// Opaque conversion key.
    k: String,
}

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    status: String,
    dlink: Option<String>,
}

/// Resolves YouTube videos, shorts, and audio-only requests.
#[derive(Debug, Clone)]
pub struct YouTubeExtractor {
    mirror_base: String,
    retry: RetryPolicy,
}

impl Default for YouTubeExtractor {
    fn default() -> Self {
        Self::with_base_url(Endpoints::default().youtube_mirror)
    }
}

impl YouTubeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy against a custom mirror host (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(mirror_base: impl Into<String>) -> Self {
        Self {
            mirror_base: mirror_base.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Mirror-bound request options carrying the session cookie.
    fn mirror_request(&self, cookie: Option<&str>) -> RequestOptions {
        let request = RequestOptions::new()
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", format!("{}/", self.mirror_base))
            .header("Origin", self.mirror_base.clone());
        match cookie {
            Some(cookie) => request.header("Cookie", cookie),
            None => request,
        }
    }

    /// Loads the landing page for its cookies. Failure only costs the cookie.
    ///
    /// Cookies come from the call's jar, so ones set on a redirect hop (for
    /// example `/` to a locale path) are forwarded too.
    async fn prime_session(&self, ctx: &ResolveContext) -> Option<String> {
        let landing = format!("{}/", self.mirror_base);
        if let Err(error) = ctx.transport().get(&landing, &RequestOptions::new()).await {
            debug!(error = %error, "mirror landing page failed; continuing without cookies");
        }
        ctx.transport().cookie_header(&landing)
    }

    async fn post_form(
        &self,
        ctx: &ResolveContext,
        label: &str,
        endpoint: &str,
        fields: &[(&str, &str)],
        request: &RequestOptions,
    ) -> Result<Response, ExtractError> {
        let endpoint_url = format!("{}{endpoint}", self.mirror_base);
        with_retry(&self.retry, label, || {
            ctx.transport()
                .post(&endpoint_url, RequestBody::form(fields), request)
        })
        .await
    }
}

#[async_trait]
impl Extractor for YouTubeExtractor {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url, ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
        let Some(video_id) = video_id(url) else {
            return Err(ExtractError::parse(
                Platform::YouTube,
                url.as_str(),
                "URL has no video id",
            )
            .into());
        };
        let quality = ctx.quality();
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");

        let cookie = self.prime_session(ctx).await;
        let request = self.mirror_request(cookie.as_deref());

        let kind = if quality == Quality::AudioOnly { "mp3" } else { "mp4" };
        let search: SearchResponse = self
            .post_form(
                ctx,
                "youtube-search",
                "/api/ajaxSearch",
                &[("q", watch_url.as_str()), ("vt", kind)],
                &request,
            )
            .await?
            .json()?;
        if search.status != "ok" {
            return Err(ExtractError::parse(
                Platform::YouTube,
                url.as_str(),
                format!("mirror search failed: {}", search.mess),
            )
            .into());
        }

        let (media_type, candidates) = match candidate_links(&search.links, quality) {
            (_, candidates) if candidates.is_empty() => {
                return Err(ExtractError::parse(
                    Platform::YouTube,
                    url.as_str(),
                    "mirror offered no downloadable formats",
                )
                .into());
            }
            found => found,
        };

        let vid = search.vid.as_deref().unwrap_or(&video_id);
        let mut direct = None;
        for candidate in &candidates {
            let converted: ConvertResponse = match self
                .post_form(
                    ctx,
                    "youtube-convert",
                    "/api/ajaxConvert",
                    &[("vid", vid), ("k", candidate.k.as_str())],
                    &request,
                )
                .await
            {
                Ok(response) => response.json()?,
                Err(error) if error.is_retryable() => return Err(error.into()),
                Err(error) => {
                    warn!(quality = %candidate.q, error = %error, "format conversion rejected");
                    continue;
                }
            };
            match converted.dlink.filter(|link| !link.is_empty()) {
                Some(link) if converted.status == "ok" && !is_manifest(&link) => {
                    direct = Some((candidate, link));
                    break;
                }
                _ => debug!(quality = %candidate.q, "no direct link for format; trying next"),
            }
        }
        let Some((chosen, link)) = direct else {
            return Err(ExtractError::parse(
                Platform::YouTube,
                url.as_str(),
                "no format converted to a direct file",
            )
            .into());
        };

        let content_type = match (media_type, chosen.f.as_deref()) {
            (MediaType::Audio, _) => Some("audio/mpeg"),
            (_, Some("webm")) => Some("video/webm"),
            _ => Some("video/mp4"),
        };
        let item = build_item(
            Platform::YouTube,
            media_type,
            &link,
            Some(&video_id),
            None,
            content_type,
        )?;

        let title = search
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| format!("YouTube {video_id}"));
        let author = search.a.unwrap_or_else(|| "unknown".to_string());

        Ok(MediaResult::new(
            url.as_str(),
            vec![item],
            BTreeMap::new(),
            MediaMeta::new(Platform::YouTube, title, author),
        )?)
    }
}

/// Orders the offered formats by the quality hint, unknown labels last.
///
/// Audio-only falls back to video formats when the mirror offers no audio.
fn candidate_links(links: &SearchLinks, quality: Quality) -> (MediaType, Vec<FormatLink>) {
    if quality == Quality::AudioOnly && !links.mp3.is_empty() {
        let labels = quality.labels_for(Platform::YouTube);
        return (MediaType::Audio, order_by_labels(&links.mp3, &labels));
    }
    let labels = if quality == Quality::AudioOnly {
        Quality::Best.labels_for(Platform::YouTube)
    } else {
        quality.labels_for(Platform::YouTube)
    };
    (MediaType::Video, order_by_labels(&links.mp4, &labels))
}

fn order_by_labels(links: &BTreeMap<String, FormatLink>, labels: &[&str]) -> Vec<FormatLink> {
    let mut ordered: Vec<FormatLink> = labels
        .iter()
        .filter_map(|label| links.values().find(|link| link.q.eq_ignore_ascii_case(label)))
        .cloned()
        .collect();
    for link in links.values() {
        if !ordered.iter().any(|seen| seen.k == link.k) {
            ordered.push(link.clone());
        }
    }
    ordered
}

/// Extracts the 11-character id from watch, `youtu.be`, shorts, embed, and live URLs.
fn video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
        Some(id.into_owned())
    } else {
        let mut segments = url.path_segments()?;
        segments.find(|segment| matches!(*segment, "shorts" | "embed" | "live" | "v"))?;
        segments.next().map(str::to_string)
    }?;
    (candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    .then_some(candidate)
}
