//! Host-based routing from a post URL to its platform strategy.
//!
//! The route table is an ordered list fixed at construction. Each route owns
//! a factory that builds its strategy the first time the route matches; later
//! matches return the same shared instance.
//!
//! # Example
//!
//! ```no_run
//! use media_resolver::Router;
//!
//! let router = Router::default_router();
//! let matched = router.route("https://www.reddit.com/r/rust/comments/abc123/post/")?;
//! assert_eq!(matched.platform.name(), "reddit");
//! # Ok::<(), media_resolver::ExtractError>(())
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::error::ExtractError;
use crate::extractor::scrape::compile_static_regex;
use crate::extractor::{
    Endpoints, Extractor, FacebookExtractor, InstagramExtractor, PinterestExtractor,
    RedditExtractor, TikTokExtractor, TwitterExtractor, VimeoExtractor, YouTubeExtractor,
};
use crate::platform::Platform;

/// Country-coded Pinterest hosts: `uk.pinterest.com`, `pinterest.de`,
/// `pinterest.co.uk`, `pinterest.com.au`.
static PINTEREST_HOST: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"^(?:[a-z]{2}\.)?pinterest\.(?:com|[a-z]{2}|co\.[a-z]{2}|com\.[a-z]{2})$")
});

static DEFAULT_ROUTER: LazyLock<Arc<Router>> =
    LazyLock::new(|| Arc::new(Router::with_endpoints(Endpoints::default())));

/// How a route recognizes a host. Hosts are compared lowercase with any
/// leading `www.` removed.
#[derive(Debug, Clone)]
pub enum HostRule {
    /// The host equals this value.
    Exact(String),
    /// The host equals this value or is one of its subdomains.
    Subdomain(String),
    /// The host matches this expression.
    Pattern(Regex),
}

impl HostRule {
    #[must_use]
    pub fn exact(host: &str) -> Self {
        Self::Exact(host.to_ascii_lowercase())
    }

    #[must_use]
    pub fn subdomain(host: &str) -> Self {
        Self::Subdomain(host.to_ascii_lowercase())
    }

    /// Returns true if `host` (already normalized) satisfies the rule.
    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(expected) => host == expected,
            Self::Subdomain(parent) => {
                host == parent
                    || host
                        .strip_suffix(parent.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            Self::Pattern(pattern) => pattern.is_match(host),
        }
    }
}

type ExtractorFactory = Box<dyn Fn() -> Arc<dyn Extractor> + Send + Sync>;

struct Route {
    platform: Platform,
    rules: Vec<HostRule>,
    factory: ExtractorFactory,
    extractor: OnceLock<Arc<dyn Extractor>>,
}

impl Route {
    fn matches(&self, host: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(host))
    }

    fn extractor(&self) -> Arc<dyn Extractor> {
        Arc::clone(self.extractor.get_or_init(|| {
            debug!(platform = self.platform.name(), "initializing strategy");
            (self.factory)()
        }))
    }
}

/// A successful routing decision.
#[derive(Clone)]
pub struct RouteMatch {
    pub platform: Platform,
    pub extractor: Arc<dyn Extractor>,
    /// The parsed input URL.
    pub url: Url,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("platform", &self.platform)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// Ordered route table. First matching route wins.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("platforms", &self.platforms())
            .finish()
    }
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route. Routes are tested in registration order.
    pub fn register<F>(&mut self, platform: Platform, rules: Vec<HostRule>, factory: F)
    where
        F: Fn() -> Arc<dyn Extractor> + Send + Sync + 'static,
    {
        self.routes.push(Route {
            platform,
            rules,
            factory: Box::new(factory),
            extractor: OnceLock::new(),
        });
    }

    /// Builds the standard eight-platform table against `endpoints`.
    #[must_use]
    pub fn with_endpoints(endpoints: Endpoints) -> Self {
        let endpoints = Arc::new(endpoints);
        let mut router = Self::new();

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::Pinterest,
            vec![
                HostRule::Pattern(PINTEREST_HOST.clone()),
                HostRule::exact("pin.it"),
            ],
            move || Arc::new(PinterestExtractor::with_base_urls(&e.pinterest_api, &e.pinterest_short)),
        );

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::Instagram,
            vec![HostRule::subdomain("instagram.com"), HostRule::exact("instagr.am")],
            move || Arc::new(InstagramExtractor::with_base_url(&e.instagram)),
        );

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::Facebook,
            vec![
                HostRule::subdomain("facebook.com"),
                HostRule::exact("fb.watch"),
                HostRule::subdomain("fb.com"),
            ],
            move || Arc::new(FacebookExtractor::with_base_url(&e.facebook)),
        );

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::TikTok,
            vec![HostRule::subdomain("tiktok.com")],
            move || Arc::new(TikTokExtractor::with_base_urls(&e.tiktok_api, &e.tiktok_oembed)),
        );

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::Twitter,
            ["twitter.com", "x.com", "fxtwitter.com", "vxtwitter.com", "fixupx.com"]
                .into_iter()
                .map(HostRule::subdomain)
                .collect(),
            move || Arc::new(TwitterExtractor::with_base_url(&e.twitter_api)),
        );

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::Reddit,
            vec![HostRule::subdomain("reddit.com"), HostRule::exact("redd.it")],
            move || Arc::new(RedditExtractor::with_base_url(&e.reddit)),
        );

        let e = Arc::clone(&endpoints);
        router.register(
            Platform::Vimeo,
            vec![HostRule::subdomain("vimeo.com")],
            move || Arc::new(VimeoExtractor::with_base_url(&e.vimeo_player)),
        );

        router.register(
            Platform::YouTube,
            vec![
                HostRule::subdomain("youtube.com"),
                HostRule::exact("youtu.be"),
                HostRule::subdomain("youtube-nocookie.com"),
            ],
            move || Arc::new(YouTubeExtractor::with_base_url(&endpoints.youtube_mirror)),
        );

        router
    }

    /// The process-wide router over the public endpoints.
    #[must_use]
    pub fn default_router() -> Arc<Router> {
        Arc::clone(&DEFAULT_ROUTER)
    }

    /// Registered platforms in route order.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        self.routes.iter().map(|route| route.platform).collect()
    }

    /// Finds the strategy for `raw_url` without touching the network.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::Parse`] without platform if the URL is not an
    ///   absolute http(s) URL with a host.
    /// - [`ExtractError::PlatformNotSupported`] if no route matches.
    pub fn route(&self, raw_url: &str) -> Result<RouteMatch, ExtractError> {
        let url = parse_post_url(raw_url)?;
        let host = normalized_host(&url)
            .ok_or_else(|| ExtractError::invalid_input(raw_url, "URL has no host"))?;

        let route = self
            .routes
            .iter()
            .find(|route| route.matches(&host))
            .ok_or_else(|| ExtractError::platform_not_supported(raw_url))?;

        Ok(RouteMatch {
            platform: route.platform,
            extractor: route.extractor(),
            url,
        })
    }

    /// Returns true if some route accepts `raw_url`.
    #[must_use]
    pub fn is_supported(&self, raw_url: &str) -> bool {
        parse_post_url(raw_url)
            .ok()
            .and_then(|url| normalized_host(&url))
            .is_some_and(|host| self.routes.iter().any(|route| route.matches(&host)))
    }
}

fn parse_post_url(raw_url: &str) -> Result<Url, ExtractError> {
    let url = Url::parse(raw_url.trim())
        .map_err(|error| ExtractError::invalid_input(raw_url, format!("malformed URL: {error}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractError::invalid_input(
            raw_url,
            format!("unsupported URL scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn normalized_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
