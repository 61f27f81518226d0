//! Error types shared by the transport, the strategies, and the facade.
//!
//! Every failure that crosses the public boundary is one of three kinds,
//! following the What/Why/Suggestion pattern used across the project.

use thiserror::Error;

use crate::platform::Platform;

/// Errors that can occur while resolving a post URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No registered strategy handles the URL's host.
    #[error(
        "platform not supported for '{url}'\n  Suggestion: Check the URL or use a link from a supported platform"
    )]
    PlatformNotSupported {
        /// The original input URL.
        url: String,
    },

    /// The remote endpoint could not be reached or answered with a failure status.
    #[error("network error for '{url}': {message}\n  Suggestion: {}", network_suggestion(.timed_out, .status))]
    Network {
        /// The request URL that failed.
        url: String,
        /// HTTP status code, when the server answered.
        status: Option<u16>,
        /// True when the request exceeded its deadline.
        timed_out: bool,
        /// Human-readable failure description.
        message: String,
    },

    /// The endpoint answered but no usable media could be extracted.
    #[error("could not extract media ({}) from '{url}': {reason}\n  Suggestion: {}", platform_label(.platform), parse_suggestion(.platform))]
    Parse {
        /// Strategy that failed; `None` for invalid input or configuration.
        platform: Option<Platform>,
        /// The input URL.
        url: String,
        /// Why extraction failed.
        reason: String,
    },
}

fn network_suggestion(timed_out: &bool, status: &Option<u16>) -> &'static str {
    match (*timed_out, *status) {
        (true, _) => "Increase the timeout or check your connection",
        (_, Some(404 | 410)) => "The post may have been deleted or made private",
        (_, Some(429)) => "Rate limited by the platform; wait before retrying",
        (_, Some(s)) if s >= 500 => "The upstream service is unavailable; try again later",
        _ => "Check your network connection or proxy settings",
    }
}

fn platform_label(platform: &Option<Platform>) -> &'static str {
    platform.map_or("input", Platform::name)
}

fn parse_suggestion(platform: &Option<Platform>) -> &'static str {
    if platform.is_some() {
        "The post may be private, removed, or the platform changed its page format"
    } else {
        "Check that the input is an absolute http(s) URL and the options are valid"
    }
}

impl ExtractError {
    /// Creates a `PlatformNotSupported` error.
    #[must_use]
    pub fn platform_not_supported(url: &str) -> Self {
        Self::PlatformNotSupported {
            url: url.to_string(),
        }
    }

    /// Creates a `Network` error for a transport-level failure.
    #[must_use]
    pub fn network(url: &str, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.to_string(),
            status: None,
            timed_out: false,
            message: message.into(),
        }
    }

    /// Creates a `Network` error for a non-2xx response.
    #[must_use]
    pub fn http_status(url: &str, status: u16) -> Self {
        Self::Network {
            url: url.to_string(),
            status: Some(status),
            timed_out: false,
            message: format!("server returned HTTP {status}"),
        }
    }

    /// Creates a `Network` error for an expired deadline.
    #[must_use]
    pub fn timeout(url: &str, after_ms: u128) -> Self {
        Self::Network {
            url: url.to_string(),
            status: None,
            timed_out: true,
            message: format!("request timed out after {after_ms} ms"),
        }
    }

    /// Creates a `Parse` error tagged with the failing platform.
    #[must_use]
    pub fn parse(platform: Platform, url: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            platform: Some(platform),
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Parse` error without platform context (malformed input or options).
    #[must_use]
    pub fn invalid_input(url: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            platform: None,
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the platform a `Parse` error is tagged with.
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        match self {
            Self::Parse { platform, .. } => *platform,
            _ => None,
        }
    }

    /// Returns true for network failures worth retrying: timeouts, connection
    /// failures without a status, 429, and 5xx.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network {
                timed_out: true, ..
            }
            | Self::Network { status: None, .. } => true,
            Self::Network {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this is a `Network` error raised by an expired deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Network {
                timed_out: true,
                ..
            }
        )
    }
}
