//! Closed set of supported platforms.

use std::fmt;

use serde::Serialize;

/// A platform with a dedicated extraction strategy.
///
/// The set is closed: adding a platform means adding a variant, a strategy
/// module, and a route in [`crate::router`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    Pinterest,
    Reddit,
    TikTok,
    Twitter,
    Vimeo,
    YouTube,
}

impl Platform {
    /// Every platform, in default route registration order.
    pub const ALL: [Platform; 8] = [
        Platform::Pinterest,
        Platform::Instagram,
        Platform::Facebook,
        Platform::TikTok,
        Platform::Twitter,
        Platform::Reddit,
        Platform::Vimeo,
        Platform::YouTube,
    ];

    /// Stable lowercase name used in logs, errors, and filenames.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Pinterest => "pinterest",
            Platform::Reddit => "reddit",
            Platform::TikTok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Vimeo => "vimeo",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names_are_unique_and_lowercase() {
        let mut names: Vec<&str> = Platform::ALL.iter().map(|p| p.name()).collect();
        for name in &names {
            assert_eq!(*name, name.to_ascii_lowercase());
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Platform::ALL.len());
    }

    #[test]
    fn test_platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::TikTok).unwrap_or_default();
        assert_eq!(json, "\"tiktok\"");
        assert_eq!(Platform::YouTube.to_string(), "youtube");
    }
}
