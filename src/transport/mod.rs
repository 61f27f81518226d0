//! Minimal HTTP GET/POST wrapper shared by every strategy.
//!
//! The transport owns three policies: the call deadline (enforced by dropping
//! the in-flight future), header injection, and failure translation. It is the
//! only place an HTTP status becomes an error; strategies receive either a
//! successful [`Response`] or an [`ExtractError::Network`].
//!
//! No retries happen here. Strategies that front flaky services wrap calls in
//! [`crate::retry::with_retry`].

mod client;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::context::ResolveOptions;
use crate::error::ExtractError;

use client::{BuildClientFailure, build_call_client};

/// Proxy URL schemes accepted in [`ResolveOptions::proxy`].
const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers for this request only; they win over call-level headers.
    pub headers: Vec<(String, String)>,
    /// Deadline for this request; the call deadline when unset.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// POST payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
    /// JSON document.
    Json(serde_json::Value),
}

impl RequestBody {
    /// Builds a form body from borrowed pairs.
    #[must_use]
    pub fn form(fields: &[(&str, &str)]) -> Self {
        Self::Form(
            fields
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        )
    }
}

/// A fully-read successful response.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    url: String,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: String,
}

impl Response {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Final URL after redirects.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns a response header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the decoder error unchanged; strategies propagate it and the
    /// strategy boundary tags it with the platform.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    /// Cookies set by the final response, as `(name, value)` pairs.
    ///
    /// Cookies set on redirect hops are only in the transport's jar; see
    /// [`Transport::cookie_header`].
    #[must_use]
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }
}

/// HTTP transport scoped to one resolution.
///
/// Owns a cookie jar for the call: every response, including intermediate
/// redirects, stores its cookies there and later requests send them back.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    timeout: Duration,
    cookie_jar: Arc<Jar>,
}

impl Transport {
    /// Builds the transport for one call.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Parse`] without platform for an invalid proxy
    /// or header, and [`ExtractError::Network`] if the client cannot be built.
    pub fn new(options: &ResolveOptions) -> Result<Self, ExtractError> {
        let timeout = options.effective_timeout();
        let proxy = options.proxy.as_deref().map(parse_proxy).transpose()?;
        let default_headers = header_map(options.headers.iter())?;
        let cookie_jar = Arc::new(Jar::default());

        let client = match build_call_client(timeout, proxy, &default_headers, &cookie_jar) {
            Ok(client) => client,
            Err(BuildClientFailure::Build(error)) => {
                return Err(ExtractError::network(
                    "",
                    format!("HTTP client construction failed: {error}"),
                ));
            }
            Err(BuildClientFailure::Panic) => {
                return Err(ExtractError::network(
                    "",
                    "HTTP client construction panicked while initializing networking",
                ));
            }
        };

        Ok(Self {
            client,
            timeout,
            cookie_jar,
        })
    }

    /// The call-level request deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Renders the cookies this call has collected for `url` as a `Cookie`
    /// header value. `None` for an unparseable URL or an empty jar.
    #[must_use]
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        self.cookie_jar
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
            .filter(|value| !value.is_empty())
    }

    /// Sends a GET request and reads the body.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Network`] on timeout, transport failure, or a
    /// non-2xx status.
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn get(&self, url: &str, request: &RequestOptions) -> Result<Response, ExtractError> {
        self.execute(self.client.get(url), url, request).await
    }

    /// Sends a POST request with `body` and reads the response body.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn post(
        &self,
        url: &str,
        body: RequestBody,
        request: &RequestOptions,
    ) -> Result<Response, ExtractError> {
        let builder = match body {
            RequestBody::Form(fields) => self.client.post(url).form(&fields),
            RequestBody::Json(value) => self.client.post(url).json(&value),
        };
        self.execute(builder, url, request).await
    }

    /// Sends a GET and returns once headers arrive, leaving the body unread.
    ///
    /// The deadline covers only the time to first response; the caller owns
    /// the body stream.
    pub(crate) async fn open(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<reqwest::Response, ExtractError> {
        let headers = header_map(headers.iter())?;
        let deadline = self.timeout;
        let send = self.client.get(url).headers(headers).send();
        let response = tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| ExtractError::timeout(url, deadline.as_millis()))?
            .map_err(|error| translate_error(url, &error, deadline))?;
        check_status(url, response.status().as_u16())?;
        Ok(response)
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        url: &str,
        request: &RequestOptions,
    ) -> Result<Response, ExtractError> {
        let headers = header_map(request.headers.iter().map(|(name, value)| (name, value)))?;
        let deadline = request.timeout.unwrap_or(self.timeout);
        let builder = builder.headers(headers);

        // Dropping the future on expiry aborts the request even if the peer never closes.
        let exchange = async {
            let response = builder
                .send()
                .await
                .map_err(|error| translate_error(url, &error, deadline))?;
            let status = response.status().as_u16();
            check_status(url, status)?;

            let final_url = response.url().to_string();
            let headers = response.headers().clone();
            let cookies = response
                .cookies()
                .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
                .collect();
            let body = response
                .text()
                .await
                .map_err(|error| translate_error(url, &error, deadline))?;

            Ok(Response {
                status,
                url: final_url,
                headers,
                cookies,
                body,
            })
        };

        let response = tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| ExtractError::timeout(url, deadline.as_millis()))??;
        debug!(
            status = response.status,
            bytes = response.body.len(),
            "request complete"
        );
        Ok(response)
    }
}

fn check_status(url: &str, status: u16) -> Result<(), ExtractError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(ExtractError::http_status(url, status))
    }
}

pub(crate) fn translate_error(url: &str, error: &reqwest::Error, deadline: Duration) -> ExtractError {
    if error.is_timeout() {
        ExtractError::timeout(url, deadline.as_millis())
    } else {
        ExtractError::network(url, error_chain_message(error))
    }
}

/// Flattens an error and its sources into one message so the original cause
/// survives without exposing the reqwest type.
fn error_chain_message(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn parse_proxy(proxy: &str) -> Result<Proxy, ExtractError> {
    let parsed = Url::parse(proxy.trim())
        .map_err(|error| ExtractError::invalid_input(proxy, format!("invalid proxy URL: {error}")))?;
    if !PROXY_SCHEMES.contains(&parsed.scheme()) {
        return Err(ExtractError::invalid_input(
            proxy,
            format!("unsupported proxy scheme '{}'", parsed.scheme()),
        ));
    }
    Proxy::all(parsed.as_str())
        .map_err(|error| ExtractError::invalid_input(proxy, format!("invalid proxy URL: {error}")))
}

fn header_map<'a, I>(headers: I) -> Result<HeaderMap, ExtractError>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ExtractError::invalid_input(name, "invalid header name"))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ExtractError::invalid_input(name, "invalid header value"))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn transport_with_timeout(timeout: Duration) -> Transport {
        Transport::new(&ResolveOptions::new().with_timeout(timeout)).unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_body_and_final_url() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&mock_server)
            .await;

        let transport = transport_with_timeout(Duration::from_secs(5));
        let url = format!("{}/page", mock_server.uri());
        let response = transport.get(&url, &RequestOptions::new()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text(), "hello");
        assert_eq!(response.url(), url);
    }

    #[tokio::test]
    async fn test_non_success_status_becomes_network_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let transport = transport_with_timeout(Duration::from_secs(5));
        let err = transport
            .get(&format!("{}/missing", mock_server.uri()), &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExtractError::Network { status: Some(404), timed_out: false, .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_stalled_response_times_out_near_deadline() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&mock_server)
            .await;

        let transport = transport_with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let err = transport
            .get(&format!("{}/slow", mock_server.uri()), &RequestOptions::new())
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "got: {err:?}");
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_request_timeout_overrides_call_timeout() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&mock_server)
            .await;

        let transport = transport_with_timeout(Duration::from_secs(20));
        let started = Instant::now();
        let err = transport
            .get(
                &format!("{}/slow", mock_server.uri()),
                &RequestOptions::new().timeout(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_call_and_request_headers_are_sent() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(header("x-call", "call"))
            .and(header("x-request", "request"))
            .and(body_string_contains("url=https%3A%2F%2Fexample.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport =
            Transport::new(&ResolveOptions::new().with_header("x-call", "call")).unwrap();
        let response = transport
            .post(
                &format!("{}/api", mock_server.uri()),
                RequestBody::form(&[("url", "https://example.com")]),
                &RequestOptions::new().header("x-request", "request"),
            )
            .await
            .unwrap();
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_cookies_are_exposed_as_header_value() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "session=abc; Path=/")
                    .append_header("set-cookie", "csrf=xyz; Path=/"),
            )
            .mount(&mock_server)
            .await;

        let transport = transport_with_timeout(Duration::from_secs(5));
        let response = transport
            .get(&mock_server.uri(), &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.cookies().len(), 2);
        let jar_cookies = transport.cookie_header(&mock_server.uri()).unwrap();
        assert!(jar_cookies.contains("session=abc"), "{jar_cookies}");
        assert!(jar_cookies.contains("csrf=xyz"), "{jar_cookies}");
    }

    #[tokio::test]
    async fn test_cookies_from_redirect_hops_are_kept_for_the_call() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("set-cookie", "session=abc; Path=/")
                    .insert_header("location", "/en"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en"))
            .respond_with(ResponseTemplate::new(200).set_body_string("landing"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = transport_with_timeout(Duration::from_secs(5));
        let landing = transport
            .get(&format!("{}/", mock_server.uri()), &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(landing.text(), "landing");
        assert!(landing.cookies().is_empty());
        assert_eq!(
            transport.cookie_header(&mock_server.uri()).as_deref(),
            Some("session=abc")
        );

        let api = transport
            .get(&format!("{}/api", mock_server.uri()), &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(api.text(), "ok");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error_without_status() {
        let transport = transport_with_timeout(Duration::from_secs(2));
        let err = transport
            .get("http://127.0.0.1:9/unreachable", &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExtractError::Network { status: None, .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn test_parse_proxy_rejects_unknown_scheme() {
        assert!(parse_proxy("ftp://proxy.example.com:21").is_err());
        assert!(parse_proxy("socks5://127.0.0.1:1080").is_ok());
    }

    #[test]
    fn test_cookie_header_none_for_fresh_transport() {
        let transport = transport_with_timeout(Duration::from_secs(1));
        assert!(transport.cookie_header("https://example.com/").is_none());
        assert!(transport.cookie_header("not a url").is_none());
    }
}
