//! Injected observability hooks for the resolution facade.
//!
//! The facade reports lifecycle events to a [`ResolveObserver`] rather than
//! logging directly, so embedders can route them to metrics or a progress UI.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::media::MediaResult;
use crate::platform::Platform;

/// Receives lifecycle events for each resolution. All methods default to no-ops.
pub trait ResolveObserver: Send + Sync {
    /// A URL was routed and its strategy is about to run.
    fn resolve_started(&self, _url: &str, _platform: Platform) {}

    /// A strategy produced a result.
    fn resolve_succeeded(&self, _url: &str, _result: &MediaResult, _elapsed: Duration) {}

    /// Routing or extraction failed.
    fn resolve_failed(&self, _url: &str, _error: &ExtractError, _elapsed: Duration) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ResolveObserver for NoopObserver {}

/// Emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ResolveObserver for TracingObserver {
    fn resolve_started(&self, url: &str, platform: Platform) {
        debug!(url, platform = platform.name(), "resolving");
    }

    fn resolve_succeeded(&self, url: &str, result: &MediaResult, elapsed: Duration) {
        info!(
            url,
            platform = result.platform().name(),
            items = result.urls().len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "resolved"
        );
    }

    fn resolve_failed(&self, url: &str, error: &ExtractError, elapsed: Duration) {
        warn!(
            url,
            platform = error.platform().map(Platform::name),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "resolution failed"
        );
    }
}
