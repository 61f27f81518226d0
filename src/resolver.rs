//! Resolution facade: route, build a per-call context, run the strategy.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use crate::batch::BatchResolver;
use crate::context::{ResolveContext, ResolveOptions};
use crate::error::ExtractError;
use crate::extractor::run_extractor;
use crate::media::MediaResult;
use crate::observe::{ResolveObserver, TracingObserver};
use crate::router::Router;

static DEFAULT_RESOLVER: LazyLock<MediaResolver> = LazyLock::new(MediaResolver::default);

/// Turns post URLs into [`MediaResult`]s.
///
/// Cloning is cheap; clones share the route table and observer.
#[derive(Clone)]
pub struct MediaResolver {
    router: Arc<Router>,
    observer: Arc<dyn ResolveObserver>,
}

impl Default for MediaResolver {
    /// The process-wide router with a [`TracingObserver`].
    fn default() -> Self {
        Self::new(Router::default_router()).with_observer(Arc::new(TracingObserver))
    }
}

impl fmt::Debug for MediaResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaResolver")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl MediaResolver {
    /// Creates a resolver over `router` that reports to no observer.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            observer: Arc::new(crate::observe::NoopObserver),
        }
    }

    /// Replaces the lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ResolveObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Resolves one post URL.
    ///
    /// Routing happens before any I/O, so unsupported or malformed URLs fail
    /// without a network request. Each call gets its own transport built from
    /// `options`.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::PlatformNotSupported`] if no route accepts the host.
    /// - [`ExtractError::Parse`] without platform for malformed input or
    ///   invalid options (for example an unparseable proxy).
    /// - [`ExtractError::Network`] or platform-tagged [`ExtractError::Parse`]
    ///   from the strategy.
    pub async fn resolve(&self, url: &str, options: &ResolveOptions) -> Result<MediaResult, ExtractError> {
        let started = Instant::now();
        let outcome = self.resolve_inner(url, options).await;
        match &outcome {
            Ok(result) => self
                .observer
                .resolve_succeeded(url, result, started.elapsed()),
            Err(error) => self.observer.resolve_failed(url, error, started.elapsed()),
        }
        outcome
    }

    async fn resolve_inner(&self, url: &str, options: &ResolveOptions) -> Result<MediaResult, ExtractError> {
        let matched = self.router.route(url)?;
        self.observer.resolve_started(url, matched.platform);
        let ctx = ResolveContext::new(options.clone())?;
        run_extractor(matched.extractor.as_ref(), &matched.url, &ctx).await
    }

    /// Resolves many URLs with the default batch concurrency, keeping only
    /// successes in input order. Use [`BatchResolver`] to see failures.
    pub async fn resolve_many<I, S>(&self, urls: I, options: &ResolveOptions) -> Vec<MediaResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchResolver::with_default_concurrency(self.clone())
            .resolve_all(urls, options)
            .await
            .into_successes()
    }
}

/// Resolves one post URL with the default resolver.
///
/// # Errors
///
/// See [`MediaResolver::resolve`].
pub async fn resolve(url: &str, options: &ResolveOptions) -> Result<MediaResult, ExtractError> {
    DEFAULT_RESOLVER.resolve(url, options).await
}

/// Resolves many URLs with the default resolver; failures are dropped.
pub async fn resolve_many<I, S>(urls: I, options: &ResolveOptions) -> Vec<MediaResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DEFAULT_RESOLVER.resolve_many(urls, options).await
}
