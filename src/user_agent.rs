//! Shared User-Agent strings for transport and stream requests.
//!
//! Platform web pages serve degraded or empty markup to non-browser agents, so
//! the default identifies as a desktop browser.

/// Browser User-Agent applied to every request unless the caller overrides it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Tool identifier sent alongside JSON API calls that accept any agent.
#[must_use]
pub(crate) fn tool_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("media-resolver/{version}")
}
