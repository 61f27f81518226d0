//! Shared scraping helpers: marker capture, JS string unescaping, meta tags,
//! and embedded JSON discovery.
//!
//! Every lookup returns `Option`; a missing marker is never a panic.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static META_TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?is)<meta\s[^>]*>"));

static META_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\b(?:property|name|itemprop)\s*=\s*["']([^"']+)["']"#)
});

static META_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
});

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<title[^>]*>(.*?)</title>"));

static JSON_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<script[^>]*\btype\s*=\s*["']application/(?:ld\+)?json["'][^>]*>(.*?)</script>"#,
    )
});

/// Returns the text between the first `start` marker and the next `end`.
///
/// `None` when either marker is missing or the capture is empty.
#[must_use]
pub(crate) fn between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let rest = &haystack[from..];
    let to = rest.find(end)?;
    let captured = &rest[..to];
    (!captured.is_empty()).then_some(captured)
}

/// Decodes a JavaScript string body as found inline in HTML.
///
/// Handles `\/`, `\"`, `\\`, `\n`, `\t`, `\r`, `\uXXXX` (including surrogate
/// pairs), then HTML `&amp;`. Unknown escapes are kept verbatim.
#[must_use]
pub(crate) fn unescape_js(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('/') => out.push('/'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let Some(high) = read_hex4(&mut chars) else {
                    out.push_str("\\u");
                    continue;
                };
                if (0xD800..0xDC00).contains(&high) {
                    let mut lookahead = chars.clone();
                    let low = (lookahead.next() == Some('\\') && lookahead.next() == Some('u'))
                        .then(|| read_hex4(&mut lookahead))
                        .flatten()
                        .filter(|low| (0xDC00..0xE000).contains(low));
                    if let Some(low) = low {
                        chars = lookahead;
                        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                        out.push(char::from_u32(combined).unwrap_or('\u{FFFD}'));
                    } else {
                        out.push('\u{FFFD}');
                    }
                } else {
                    out.push(char::from_u32(high).unwrap_or('\u{FFFD}'));
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out.replace("&amp;", "&")
}

fn read_hex4<I: Iterator<Item = char>>(chars: &mut I) -> Option<u32> {
    let digits: String = chars.take(4).collect();
    if digits.len() != 4 {
        return None;
    }
    u32::from_str_radix(&digits, 16).ok()
}

/// Returns the `content` of the first `<meta>` whose `property`/`name` equals `key`.
#[must_use]
pub(crate) fn meta_content(html: &str, key: &str) -> Option<String> {
    META_TAG_RE.find_iter(html).find_map(|tag| {
        let tag = tag.as_str();
        let tag_key = META_KEY_RE.captures(tag)?.get(1)?.as_str();
        if !tag_key.eq_ignore_ascii_case(key) {
            return None;
        }
        let caps = META_CONTENT_RE.captures(tag)?;
        let content = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
        (!content.is_empty()).then(|| decode_html_entities(content))
    })
}

/// Returns the document `<title>`, trimmed and entity-decoded.
#[must_use]
pub(crate) fn html_title(html: &str) -> Option<String> {
    let title = TITLE_RE.captures(html)?.get(1)?.as_str().trim();
    (!title.is_empty()).then(|| decode_html_entities(title))
}

/// Bodies of `<script type="application/json">` (and `ld+json`) tags, in document order.
#[must_use]
pub(crate) fn script_json_blobs(html: &str) -> Vec<&str> {
    JSON_SCRIPT_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
        .filter(|body| !body.is_empty())
        .collect()
}

/// Decodes the JSON string literal whose opening quote ends `marker`.
///
/// `marker` must include the opening `"`, e.g. `"contextJSON":"`.
#[must_use]
pub(crate) fn json_string_after(html: &str, marker: &str) -> Option<String> {
    let start = html.find(marker)? + marker.len();
    let rest = &html[start..];
    let mut escaped = false;
    let mut end = None;
    for (offset, ch) in rest.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                end = Some(offset);
                break;
            }
            _ => {}
        }
    }
    let literal = format!("\"{}\"", &rest[..end?]);
    serde_json::from_str::<String>(&literal).ok()
}

/// Depth-first search for the first object stored under any of `keys`.
#[must_use]
pub(crate) fn find_object<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(map) => keys
            .iter()
            .find_map(|key| map.get(*key).filter(|found| found.is_object()))
            .or_else(|| map.values().find_map(|child| find_object(child, keys))),
        Value::Array(items) => items.iter().find_map(|child| find_object(child, keys)),
        _ => None,
    }
}

/// Resolves a possibly relative URL string against `base_url`.
///
/// Returns the value as-is if it already starts with `http://` or `https://`;
/// normalizes `//...` to `https:...`; otherwise joins with `base_url`.
#[must_use]
pub(crate) fn absolutize_url(value: &str, base_url: &Url) -> Option<String> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value.to_string());
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base_url.join(value).ok().map(|url| url.to_string())
}

/// First non-empty line of `text`, cut to `max_chars` characters.
#[must_use]
pub(crate) fn short_title(text: &str, max_chars: usize) -> Option<String> {
    let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    Some(line.chars().take(max_chars).collect())
}

fn decode_html_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_between_missing_and_empty_capture() {
        assert_eq!(between(r#"x"a":"v"y"#, r#""a":""#, "\""), Some("v"));
        assert_eq!(between("nothing here", "start", "end"), None);
        assert_eq!(between(r#""a":"""#, r#""a":""#, "\""), None);
        assert_eq!(between("start but no finish", "start", "finish!"), None);
    }

    #[test]
    fn test_unescape_js_common_escapes() {
        assert_eq!(
            unescape_js(r"https:\/\/video.xx.fbcdn.net\/v\/t.mp4?a=1&b=2&amp;c=3"),
            "https://video.xx.fbcdn.net/v/t.mp4?a=1&b=2&c=3"
        );
        assert_eq!(unescape_js(r#"say \"hi\"\nbye"#), "say \"hi\"\nbye");
        assert_eq!(unescape_js(r"\ud83d\ude00"), "\u{1F600}");
        assert_eq!(unescape_js(r"caf\u00e9"), "café");
        assert_eq!(unescape_js(r"\q"), r"\q");
    }

    #[test]
    fn test_meta_content_any_attribute_order() {
        let html = r#"<meta content="A &amp; B" property="og:title"><meta name='og:image' content='https://x/y.jpg'/>"#;
        assert_eq!(meta_content(html, "og:title").unwrap(), "A & B");
        assert_eq!(meta_content(html, "og:image").unwrap(), "https://x/y.jpg");
        assert!(meta_content(html, "og:video").is_none());
    }

    #[test]
    fn test_script_json_blobs_in_order() {
        let html = r#"<script>var a=1;</script><script type="application/json" data-x>{"a":1}</script>
            <script type="application/ld+json">{"b":2}</script>"#;
        assert_eq!(script_json_blobs(html), vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn test_json_string_after_decodes_escapes() {
        let html = r#"window.x = {"contextJSON":"{\"gql\":{\"id\":\"1\"}}","other":1}"#;
        let decoded = json_string_after(html, r#""contextJSON":""#).unwrap();
        assert_eq!(decoded, r#"{"gql":{"id":"1"}}"#);
        assert!(json_string_after(html, r#""missing":""#).is_none());
    }

    #[test]
    fn test_find_object_searches_nested_arrays() {
        let value = serde_json::json!({"a": [{"b": {"target": {"id": 1}}}], "target": 3});
        assert_eq!(find_object(&value, &["target"]).unwrap()["id"], 1);
    }

    #[test]
    fn test_short_title_first_line_truncated() {
        assert_eq!(short_title("\n  hello world\nsecond", 5).unwrap(), "hello");
        assert!(short_title("   ", 10).is_none());
    }

    #[test]
    fn test_absolutize_url_relative_and_protocol_relative() {
        let base = Url::parse("https://www.tikwm.com/api/").unwrap();
        assert_eq!(
            absolutize_url("/video/media/play/1.mp4", &base).unwrap(),
            "https://www.tikwm.com/video/media/play/1.mp4"
        );
        assert_eq!(absolutize_url("//cdn.x/y", &base).unwrap(), "https://cdn.x/y");
    }
}
