//! Bounded-concurrency batch resolution with per-URL failure isolation.
//!
//! # Concurrency Model
//!
//! - Each URL resolves in its own Tokio task
//! - A semaphore permit is acquired before the task is spawned
//! - Permits are released when the task finishes (RAII)
//! - A failure or panic in one task is recorded against its URL only
//!
//! Cancellation stops dispatch: URLs not yet started are reported as
//! [`BatchStatus::Cancelled`], while started resolutions run to completion.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::context::ResolveOptions;
use crate::error::ExtractError;
use crate::extractor::panic_message;
use crate::media::MediaResult;
use crate::resolver::MediaResolver;

/// Default number of concurrent resolutions.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Minimum allowed concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENCY: usize = 100;

/// Errors configuring a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// What happened to one input URL.
#[derive(Debug, Clone)]
pub enum BatchStatus {
    Resolved(MediaResult),
    Failed(ExtractError),
    /// Never started because the batch was cancelled.
    Cancelled,
}

/// One input URL with its position and outcome.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Zero-based position in the input.
    pub index: usize,
    pub url: String,
    pub status: BatchStatus,
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Successful results in input order.
    pub fn successes(&self) -> impl Iterator<Item = &MediaResult> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            BatchStatus::Resolved(result) => Some(result),
            _ => None,
        })
    }

    /// Consumes the report, keeping only successful results in input order.
    #[must_use]
    pub fn into_successes(self) -> Vec<MediaResult> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| match outcome.status {
                BatchStatus::Resolved(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Failed URLs with their errors, in input order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExtractError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            BatchStatus::Failed(error) => Some((outcome.url.as_str(), error)),
            _ => None,
        })
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.successes().count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, BatchStatus::Cancelled))
            .count()
    }
}

/// Resolves lists of URLs through a shared [`MediaResolver`].
#[derive(Debug, Clone)]
pub struct BatchResolver {
    resolver: MediaResolver,
    concurrency: usize,
}

impl BatchResolver {
    /// Creates a batch resolver.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidConcurrency`] if `concurrency` is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(resolver))]
    pub fn new(resolver: MediaResolver, concurrency: usize) -> Result<Self, BatchError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(BatchError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            resolver,
            concurrency,
        })
    }

    /// Creates a batch resolver with [`DEFAULT_CONCURRENCY`].
    #[must_use]
    pub fn with_default_concurrency(resolver: MediaResolver) -> Self {
        Self {
            resolver,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Resolves every URL; never fails as a whole.
    pub async fn resolve_all<I, S>(&self, urls: I, options: &ResolveOptions) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolve_all_with_cancel(urls, options, CancellationToken::new())
            .await
    }

    /// Resolves every URL until `cancel` fires.
    #[instrument(skip_all, fields(concurrency = self.concurrency))]
    pub async fn resolve_all_with_cancel<I, S>(
        &self,
        urls: I,
        options: &ResolveOptions,
        cancel: CancellationToken,
    ) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(urls.len());
        let mut outcomes = Vec::with_capacity(urls.len());

        info!(total = urls.len(), "starting batch");

        let mut pending = urls.into_iter().enumerate();
        for (index, url) in pending.by_ref() {
            // Acquire semaphore permit (blocks if at concurrency limit)
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                outcomes.push(BatchOutcome {
                    index,
                    url,
                    status: BatchStatus::Cancelled,
                });
                break;
            };

            let resolver = self.resolver.clone();
            let options = options.clone();
            let task_url = url.clone();
            handles.push((
                index,
                url,
                tokio::spawn(async move {
                    let _permit = permit;
                    resolver.resolve(&task_url, &options).await
                }),
            ));
        }
        outcomes.extend(pending.map(|(index, url)| BatchOutcome {
            index,
            url,
            status: BatchStatus::Cancelled,
        }));

        debug!(task_count = handles.len(), "waiting for resolutions to complete");

        for (index, url, handle) in handles {
            let status = match handle.await {
                Ok(Ok(result)) => BatchStatus::Resolved(result),
                Ok(Err(error)) => BatchStatus::Failed(error),
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        format!("resolution panicked: {}", panic_message(&*join_error.into_panic()))
                    } else {
                        format!("resolution task aborted: {join_error}")
                    };
                    warn!(url = %url, reason, "batch task did not complete");
                    BatchStatus::Failed(ExtractError::invalid_input(&url, reason))
                }
            };
            outcomes.push(BatchOutcome { index, url, status });
        }

        outcomes.sort_by_key(|outcome| outcome.index);
        let report = BatchReport { outcomes };
        info!(
            resolved = report.resolved_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled_count(),
            "batch complete"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::context::ResolveContext;
    use crate::extractor::{Extractor, build_item};
    use crate::media::{MediaMeta, MediaType};
    use crate::platform::Platform;
    use crate::router::{HostRule, Router};

    /// Fails for paths containing `fail`, panics for `panic`, otherwise
    /// sleeps briefly and returns one item, tracking peak concurrency.
    #[derive(Default)]
    struct Scripted {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for Scripted {
        fn platform(&self) -> Platform {
            Platform::Vimeo
        }

        async fn extract(&self, url: &Url, _ctx: &ResolveContext) -> anyhow::Result<MediaResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let path = url.path();
            if path.contains("fail") {
                anyhow::bail!("scripted failure");
            }
            assert!(!path.contains("panic"), "scripted panic");
            let id = path.trim_start_matches('/');
            let item = build_item(
                Platform::Vimeo,
                MediaType::Video,
                &format!("https://cdn.example.com/{id}.mp4"),
                Some(id),
                None,
                None,
            )?;
            Ok(MediaResult::new(
                url.as_str(),
                vec![item],
                std::collections::BTreeMap::new(),
                MediaMeta::new(Platform::Vimeo, id, "tester"),
            )?)
        }
    }

    fn resolver(scripted: Arc<Scripted>) -> MediaResolver {
        let mut router = Router::new();
        router.register(Platform::Vimeo, vec![HostRule::exact("vimeo.com")], move || {
            Arc::clone(&scripted) as Arc<dyn Extractor>
        });
        MediaResolver::new(Arc::new(router))
    }

    #[test]
    fn test_concurrency_bounds() {
        let resolver = resolver(Arc::default());
        assert!(matches!(
            BatchResolver::new(resolver.clone(), 0),
            Err(BatchError::InvalidConcurrency { value: 0 })
        ));
        assert!(BatchResolver::new(resolver.clone(), 101).is_err());
        assert_eq!(BatchResolver::new(resolver.clone(), 100).unwrap().concurrency(), 100);
        assert_eq!(
            BatchResolver::with_default_concurrency(resolver).concurrency(),
            DEFAULT_CONCURRENCY
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_affect_others() {
        let batch = BatchResolver::with_default_concurrency(resolver(Arc::default()));
        let urls = [
            "https://vimeo.com/1",
            "https://vimeo.com/2",
            "https://vimeo.com/fail",
            "https://vimeo.com/4",
            "https://vimeo.com/5",
        ];
        let report = batch.resolve_all(urls, &ResolveOptions::default()).await;

        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.resolved_count(), 4);
        assert_eq!(report.failed_count(), 1);
        let (failed_url, error) = report.failures().next().unwrap();
        assert_eq!(failed_url, "https://vimeo.com/fail");
        assert_eq!(error.platform(), Some(Platform::Vimeo));
        let titles: Vec<&str> = report
            .successes()
            .map(|result| result.meta().title.as_str())
            .collect();
        assert_eq!(titles, vec!["1", "2", "4", "5"]);
    }

    #[tokio::test]
    async fn test_unsupported_and_panicking_urls_are_isolated() {
        let batch = BatchResolver::with_default_concurrency(resolver(Arc::default()));
        let report = batch
            .resolve_all(
                ["https://example.com/x", "https://vimeo.com/panic", "https://vimeo.com/3"],
                &ResolveOptions::default(),
            )
            .await;

        assert!(matches!(
            report.outcomes[0].status,
            BatchStatus::Failed(ExtractError::PlatformNotSupported { .. })
        ));
        match &report.outcomes[1].status {
            BatchStatus::Failed(ExtractError::Parse { reason, .. }) => {
                assert!(reason.contains("scripted panic"), "{reason}");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
        assert!(matches!(report.outcomes[2].status, BatchStatus::Resolved(_)));
    }

    struct PanickingObserver;

    impl crate::observe::ResolveObserver for PanickingObserver {
        fn resolve_started(&self, url: &str, _platform: Platform) {
            assert!(!url.ends_with("/2"), "observer exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_task_is_recorded_as_parse_failure() {
        let resolver = resolver(Arc::default()).with_observer(Arc::new(PanickingObserver));
        let batch = BatchResolver::with_default_concurrency(resolver);
        let report = batch
            .resolve_all(
                ["https://vimeo.com/1", "https://vimeo.com/2", "https://vimeo.com/3"],
                &ResolveOptions::default(),
            )
            .await;

        assert_eq!(report.resolved_count(), 2);
        match &report.outcomes[1].status {
            BatchStatus::Failed(ExtractError::Parse { platform, reason, .. }) => {
                assert_eq!(*platform, None);
                assert!(reason.contains("observer exploded"), "{reason}");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let scripted = Arc::new(Scripted::default());
        let batch = BatchResolver::new(resolver(Arc::clone(&scripted)), 2).unwrap();
        let urls: Vec<String> = (0..8).map(|i| format!("https://vimeo.com/{i}")).collect();
        let report = batch.resolve_all(urls, &ResolveOptions::default()).await;

        assert_eq!(report.resolved_count(), 8);
        assert!(scripted.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_undispatched_urls() {
        let batch = BatchResolver::new(resolver(Arc::default()), 1).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = batch
            .resolve_all_with_cancel(
                ["https://vimeo.com/1", "https://vimeo.com/2"],
                &ResolveOptions::default(),
                cancel,
            )
            .await;

        assert_eq!(report.cancelled_count(), 2);
        assert_eq!(report.outcomes[1].index, 1);
        assert!(report.into_successes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let batch = BatchResolver::with_default_concurrency(resolver(Arc::default()));
        let report = batch
            .resolve_all(Vec::<String>::new(), &ResolveOptions::default())
            .await;
        assert!(report.outcomes.is_empty());
    }
}
