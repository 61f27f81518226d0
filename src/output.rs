//! Human and JSON rendering of batch reports.

use std::fmt::Write as _;

use media_resolver::{BatchOutcome, BatchReport, BatchStatus, ExtractError, MediaResult};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct JsonOutcome<'a> {
    url: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a MediaResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonError>,
}

#[derive(Debug, Serialize)]
struct JsonError {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<&'static str>,
    message: String,
}

impl From<&ExtractError> for JsonError {
    fn from(error: &ExtractError) -> Self {
        let kind = match error {
            ExtractError::PlatformNotSupported { .. } => "platform_not_supported",
            ExtractError::Network { .. } => "network",
            ExtractError::Parse { .. } => "parse",
        };
        Self {
            kind,
            platform: error.platform().map(|platform| platform.name()),
            message: first_line(&error.to_string()).to_string(),
        }
    }
}

/// Renders the report as a JSON array in input order.
pub(crate) fn render_json(report: &BatchReport) -> serde_json::Result<String> {
    let outcomes: Vec<JsonOutcome<'_>> = report.outcomes.iter().map(json_outcome).collect();
    serde_json::to_string_pretty(&outcomes)
}

fn json_outcome(outcome: &BatchOutcome) -> JsonOutcome<'_> {
    let (status, result, error) = match &outcome.status {
        BatchStatus::Resolved(result) => ("resolved", Some(result), None),
        BatchStatus::Failed(error) => ("failed", None, Some(JsonError::from(error))),
        BatchStatus::Cancelled => ("cancelled", None, None),
    };
    JsonOutcome {
        url: &outcome.url,
        status,
        result,
        error,
    }
}

/// Renders the report as indented text blocks, one per input URL.
pub(crate) fn render_text(report: &BatchReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = writeln!(out, "[{}] {}", outcome.index + 1, outcome.url);
        match &outcome.status {
            BatchStatus::Resolved(result) => write_result(&mut out, result),
            BatchStatus::Failed(error) => {
                let _ = writeln!(out, "    error: {}", first_line(&error.to_string()));
            }
            BatchStatus::Cancelled => {
                let _ = writeln!(out, "    cancelled");
            }
        }
    }
    out
}

fn write_result(out: &mut String, result: &MediaResult) {
    let meta = result.meta();
    let _ = writeln!(out, "    {} | {} | by {}", meta.platform, meta.title, meta.author);
    if let Some(views) = meta.views {
        let _ = writeln!(out, "    views: {views}");
    }
    if let Some(likes) = meta.likes {
        let _ = writeln!(out, "    likes: {likes}");
    }
    for item in result.urls() {
        let _ = writeln!(
            out,
            "    - {:<5} {}  {}",
            item.media_type().as_str(),
            item.filename(),
            item.url()
        );
        for (name, value) in result.headers_for(item) {
            let _ = writeln!(out, "        {name}: {value}");
        }
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}
