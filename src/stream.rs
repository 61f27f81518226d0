//! Byte streams for resolved media items.
//!
//! The resolver never downloads; this is the hand-off point for callers that
//! do. The stream is returned as soon as response headers arrive and nothing
//! is written to disk.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, instrument};

use crate::context::ResolveOptions;
use crate::error::ExtractError;
use crate::media::MediaItem;
use crate::transport::{Transport, translate_error};

/// Body chunks of a media file.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ExtractError>> + Send>>;

/// An open media response.
pub struct MediaStream {
    /// Final URL after redirects.
    pub url: String,
    /// `Content-Length`, when the server sent one.
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl MediaStream {
    /// Drains the body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first chunk error.
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>, ExtractError> {
        let capacity = self
            .content_length
            .and_then(|length| usize::try_from(length).ok())
            .unwrap_or(0);
        let mut buffer = Vec::with_capacity(capacity);
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer)
    }
}

/// Opens `item` for streaming with `global_headers` merged under the item's
/// own headers (the item wins on conflicts).
///
/// Proxy, timeout, and default headers come from `options`. The timeout
/// bounds the wait for response headers only.
///
/// # Errors
///
/// - [`ExtractError::Parse`] without platform for invalid options or headers.
/// - [`ExtractError::Network`] on timeout, connection failure, or a non-2xx status.
#[instrument(skip_all, fields(url = %item.url()))]
pub async fn open_stream(
    item: &MediaItem,
    global_headers: &BTreeMap<String, String>,
    options: &ResolveOptions,
) -> Result<MediaStream, ExtractError> {
    let transport = Transport::new(options)?;
    let headers = item.merged_headers(global_headers);
    let response = transport.open(item.url(), &headers).await?;

    let url = response.url().to_string();
    let content_length = response.content_length();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    debug!(content_length, content_type = content_type.as_deref(), "media stream opened");

    let error_url = url.clone();
    let deadline = transport.timeout();
    let body = response
        .bytes_stream()
        .map(move |chunk| chunk.map_err(|error| translate_error(&error_url, &error, deadline)));

    Ok(MediaStream {
        url,
        content_length,
        content_type,
        body: Box::pin(body),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn item(url: String) -> MediaItem {
        MediaItem::new(MediaType::Video, url, "vimeo_1.mp4")
            .unwrap()
            .with_header("Referer", "https://vimeo.com/")
    }

    #[tokio::test]
    async fn test_stream_sends_merged_headers_and_yields_body() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/v.mp4"))
            .and(header("Referer", "https://vimeo.com/"))
            .and(header("X-Session", "s1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(vec![7_u8; 4096]),
            )
            .mount(&server)
            .await;

        let mut global = BTreeMap::new();
        global.insert("Referer".to_string(), "https://example.com/".to_string());
        global.insert("X-Session".to_string(), "s1".to_string());

        let stream = open_stream(
            &item(format!("{}/v.mp4", server.uri())),
            &global,
            &ResolveOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(stream.content_length, Some(4096));
        assert_eq!(stream.content_type.as_deref(), Some("video/mp4"));
        let bytes = stream.collect_bytes().await.unwrap();
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|byte| *byte == 7));
    }

    #[test]
    fn test_invalid_proxy_fails_before_any_request() {
        let options = ResolveOptions::default().with_proxy("ftp://proxy.example.com:21");
        let result = tokio_test::block_on(open_stream(
            &item("https://cdn.example.com/v.mp4".to_string()),
            &BTreeMap::new(),
            &options,
        ));
        assert!(matches!(result, Err(ExtractError::Parse { platform: None, .. })));
    }

    #[test]
    fn test_collect_bytes_stops_at_first_chunk_error() {
        let chunks: Vec<Result<Bytes, ExtractError>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(ExtractError::network("https://cdn.example.com/v.mp4", "connection reset")),
            Ok(Bytes::from_static(b"def")),
        ];
        let stream = MediaStream {
            url: "https://cdn.example.com/v.mp4".to_string(),
            content_length: Some(6),
            content_type: None,
            body: Box::pin(futures_util::stream::iter(chunks)),
        };
        let err = tokio_test::block_on(stream.collect_bytes()).unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stream_error_status_is_network_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = open_stream(
            &item(format!("{}/expired.mp4", server.uri())),
            &BTreeMap::new(),
            &ResolveOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::Network { status: Some(403), .. }));
    }
}
