//! CLI argument definitions using clap derive macros.

use clap::Parser;

use media_resolver::{DEFAULT_CONCURRENCY, Quality};

/// Resolve social-media post URLs into downloadable media.
///
/// Prints, for each post, the direct media URLs with suggested filenames and
/// the headers needed to fetch them. Nothing is downloaded.
#[derive(Parser, Debug)]
#[command(name = "media-resolver")]
#[command(author, version, about)]
pub struct Args {
    /// Post URLs to resolve (reads newline-separated URLs from stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Preferred quality: best, high, medium, low, or audio
    #[arg(long, default_value_t = Quality::Best)]
    pub quality: Quality,

    /// Outbound proxy (http://, https://, socks5://)
    #[arg(long, env = "MEDIA_RESOLVER_PROXY")]
    pub proxy: Option<String>,

    /// Per-request timeout in seconds (1-600)
    #[arg(short = 't', long, env = "MEDIA_RESOLVER_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout: Option<u64>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Maximum concurrent resolutions (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
