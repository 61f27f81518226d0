//! Progress bar for batch runs, driven by resolver lifecycle events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use media_resolver::{
    ExtractError, MediaResult, Platform, ResolveObserver, TracingObserver,
};

/// Advances a bar once per finished URL and forwards events to tracing.
pub(crate) struct ProgressObserver {
    bar: ProgressBar,
    tracing: TracingObserver,
}

impl ProgressObserver {
    pub(crate) fn new(total: usize) -> Self {
        let bar = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            tracing: TracingObserver,
        }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ResolveObserver for ProgressObserver {
    fn resolve_started(&self, url: &str, platform: Platform) {
        self.bar.set_message(format!("Resolving {platform} post..."));
        self.tracing.resolve_started(url, platform);
    }

    fn resolve_succeeded(&self, url: &str, result: &MediaResult, elapsed: Duration) {
        self.bar.inc(1);
        self.bar.suspend(|| self.tracing.resolve_succeeded(url, result, elapsed));
    }

    fn resolve_failed(&self, url: &str, error: &ExtractError, elapsed: Duration) {
        self.bar.inc(1);
        self.bar.suspend(|| self.tracing.resolve_failed(url, error, elapsed));
    }
}
