//! Platform-agnostic quality hints and rendition selection.
//!
//! A [`Quality`] is translated into each platform's own label vocabulary by
//! [`Quality::labels_for`]; [`select_rendition`] then walks the candidates a
//! strategy found, never choosing a streaming manifest.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::platform::Platform;

/// Caller's preferred rendition quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Highest available rendition.
    #[default]
    Best,
    /// A high but not necessarily maximal rendition (around 720p/1080p).
    High,
    /// Mid-range rendition (around 480p).
    Medium,
    /// Smallest rendition.
    Low,
    /// Audio track only where the platform offers one; otherwise treated as `Best`.
    AudioOnly,
}

/// Unrecognized quality string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown quality '{0}' (expected best, high, medium, low, or audio)")]
pub struct UnknownQuality(pub String);

impl FromStr for Quality {
    type Err = UnknownQuality;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "best" | "max" | "highest" => Ok(Self::Best),
            "high" | "hd" => Ok(Self::High),
            "medium" | "sd" => Ok(Self::Medium),
            "low" | "lowest" => Ok(Self::Low),
            "audio" | "audio_only" | "audio-only" => Ok(Self::AudioOnly),
            other => Err(UnknownQuality(other.to_string())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Best => "best",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::AudioOnly => "audio",
        })
    }
}

const RESOLUTION_LADDER: [&str; 8] = [
    "2160p", "1440p", "1080p", "720p", "540p", "480p", "360p", "240p",
];

impl Quality {
    /// True for the two hints that prefer the top of a platform's ladder.
    #[must_use]
    pub fn prefers_high(self) -> bool {
        matches!(self, Self::Best | Self::High | Self::AudioOnly)
    }

    /// Ordered rendition labels for `platform`, most preferred first.
    ///
    /// Labels are the platform's own tokens (`hd`/`sd` on Facebook,
    /// `V_720P` on Pinterest, `720p` on Vimeo/YouTube, rendition field names
    /// on TikTok and Reddit). Twitter selects by bitrate and returns no labels.
    #[must_use]
    pub fn labels_for(self, platform: Platform) -> Vec<&'static str> {
        match platform {
            Platform::Facebook => {
                if self.prefers_high() {
                    vec!["hd", "sd"]
                } else {
                    vec!["sd", "hd"]
                }
            }
            Platform::Pinterest => match self {
                Self::Best | Self::AudioOnly => vec!["V_EXP7", "V_720P", "V_480P", "V_360P"],
                Self::High => vec!["V_720P", "V_EXP7", "V_480P", "V_360P"],
                Self::Medium => vec!["V_480P", "V_720P", "V_360P"],
                Self::Low => vec!["V_360P", "V_480P", "V_720P"],
            },
            Platform::Reddit => vec!["fallback", "hls", "dash"],
            Platform::TikTok => {
                if self.prefers_high() {
                    vec!["hdplay", "play", "wmplay"]
                } else {
                    vec!["play", "hdplay", "wmplay"]
                }
            }
            Platform::Vimeo => ladder_from(match self {
                Self::Best | Self::AudioOnly => "2160p",
                Self::High => "1080p",
                Self::Medium => "720p",
                Self::Low => "360p",
            }),
            Platform::YouTube => match self {
                Self::Best => vec!["1080p", "720p", "480p", "360p", "240p", "144p"],
                Self::High => vec!["720p", "1080p", "480p", "360p", "240p", "144p"],
                Self::Medium => vec!["480p", "360p", "720p", "240p", "144p"],
                Self::Low => vec!["360p", "240p", "144p", "480p"],
                Self::AudioOnly => vec!["320kbps", "256kbps", "192kbps", "128kbps"],
            },
            Platform::Instagram | Platform::Twitter => Vec::new(),
        }
    }

    /// Boolean "HD requested" token for APIs that take a flag.
    #[must_use]
    pub fn hd_flag(self) -> &'static str {
        if self.prefers_high() { "1" } else { "0" }
    }
}

/// Descending ladder starting at `top`, followed by the higher rungs skipped over.
fn ladder_from(top: &str) -> Vec<&'static str> {
    let start = RESOLUTION_LADDER
        .iter()
        .position(|label| *label == top)
        .unwrap_or(0);
    RESOLUTION_LADDER[start..]
        .iter()
        .chain(RESOLUTION_LADDER[..start].iter().rev())
        .copied()
        .collect()
}

/// One quality/format variant of the same logical media asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub label: String,
    pub url: String,
}

impl Rendition {
    #[must_use]
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Returns true if `url` points at a segmented-stream playlist rather than a file.
#[must_use]
pub fn is_manifest(url: &str) -> bool {
    let path = Url::parse(url).map_or_else(
        |_| url.split(['?', '#']).next().unwrap_or("").to_string(),
        |parsed| parsed.path().to_string(),
    );
    let path = path.to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".mpd")
}

/// Picks the rendition to download.
///
/// Walks `priority` in order and returns the first candidate with that label
/// whose URL is a direct file. If no preferred label yields one, falls back to
/// the first direct candidate in source order. Returns `None` when every
/// candidate is a streaming manifest or `candidates` is empty.
#[must_use]
pub fn select_rendition<'a>(candidates: &'a [Rendition], priority: &[&str]) -> Option<&'a Rendition> {
    priority
        .iter()
        .find_map(|label| {
            candidates
                .iter()
                .find(|candidate| candidate.label.eq_ignore_ascii_case(label) && !is_manifest(&candidate.url))
        })
        .or_else(|| candidates.iter().find(|candidate| !is_manifest(&candidate.url)))
}
