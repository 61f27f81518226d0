//! Per-call HTTP client construction policy.
//!
//! Every resolution gets its own client so proxy, header, and cookie state
//! never leak between calls. Defaults: browser user agent, gzip, connect
//! timeout equal to the call deadline.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::user_agent::DEFAULT_USER_AGENT;

pub(crate) enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

/// Builds the client for one call, falling back to env-proxy lookup when the
/// system proxy query panics (seen in restricted macOS sandboxes).
pub(crate) fn build_call_client(
    timeout: Duration,
    proxy: Option<Proxy>,
    default_headers: &HeaderMap,
    cookie_jar: &Arc<Jar>,
) -> Result<Client, BuildClientFailure> {
    match try_build_client(timeout, proxy.clone(), default_headers, cookie_jar, false) {
        Err(BuildClientFailure::Panic) => {
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            try_build_client(timeout, proxy, default_headers, cookie_jar, true)
        }
        other => other,
    }
}

fn try_build_client(
    timeout: Duration,
    proxy: Option<Proxy>,
    default_headers: &HeaderMap,
    cookie_jar: &Arc<Jar>,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let default_headers = default_headers.clone();
    let cookie_jar = Arc::clone(cookie_jar);
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(timeout, default_headers, cookie_jar);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(timeout: Duration, default_headers: HeaderMap, cookie_jar: Arc<Jar>) -> ClientBuilder {
    // user_agent first: default_headers may carry a caller override
    Client::builder()
        .connect_timeout(timeout)
        .user_agent(DEFAULT_USER_AGENT)
        .default_headers(default_headers)
        .cookie_provider(cookie_jar)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
