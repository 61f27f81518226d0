//! Per-call options and the context handed to strategies.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ExtractError;
use crate::quality::Quality;
use crate::transport::Transport;

/// Default deadline for a single network request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Caller-supplied options for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Outbound proxy URL (`http://`, `https://`, or `socks5://`).
    pub proxy: Option<String>,
    /// Per-request deadline; [`DEFAULT_TIMEOUT`] when unset.
    pub timeout: Option<Duration>,
    /// Extra headers sent with every request of the call.
    pub headers: BTreeMap<String, String>,
    /// Preferred rendition quality.
    pub quality: Quality,
}

impl ResolveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// The deadline applied to each request of the call.
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Everything a strategy needs for one resolution.
///
/// Created fresh per call; owns the call's [`Transport`] so no network state
/// is shared between resolutions.
#[derive(Debug)]
pub struct ResolveContext {
    options: ResolveOptions,
    transport: Transport,
}

impl ResolveContext {
    /// Builds the context and its transport.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Parse`] without platform when the options are
    /// invalid (unparseable proxy URL or header).
    pub fn new(options: ResolveOptions) -> Result<Self, ExtractError> {
        let transport = Transport::new(&options)?;
        Ok(Self { options, transport })
    }

    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    #[must_use]
    pub fn quality(&self) -> Quality {
        self.options.quality
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}
