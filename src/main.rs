//! CLI entry point for the media resolver.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use media_resolver::{BatchResolver, MediaResolver, ResolveObserver, ResolveOptions, TracingObserver};
use tracing::{debug, info};

mod cli;
mod output;
mod progress;

use cli::Args;
use progress::ProgressObserver;

/// Exit code when some, but not all, URLs resolved.
const EXIT_PARTIAL: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    // Read input: from positional args or stdin
    let urls: Vec<String> = if !args.urls.is_empty() {
        args.urls.clone()
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read URLs from stdin")?;
        parse_url_lines(&buffer)
    } else {
        eprintln!("No input provided. Pass post URLs as arguments or pipe them via stdin.");
        eprintln!("Example: media-resolver https://vimeo.com/76979871");
        return Ok(ExitCode::SUCCESS);
    };

    if urls.is_empty() {
        info!("No URLs found in input");
        return Ok(ExitCode::SUCCESS);
    }

    let options = build_options(&args);
    let progress = (!args.quiet && !args.json && io::stderr().is_terminal())
        .then(|| Arc::new(ProgressObserver::new(urls.len())));
    let observer: Arc<dyn ResolveObserver> = match &progress {
        Some(progress) => Arc::clone(progress) as Arc<dyn ResolveObserver>,
        None => Arc::new(TracingObserver),
    };

    let resolver = MediaResolver::default().with_observer(observer);
    let batch = BatchResolver::new(resolver, usize::from(args.concurrency))?;
    let report = batch.resolve_all(urls, &options).await;
    if let Some(progress) = &progress {
        progress.finish();
    }

    if args.json {
        println!("{}", output::render_json(&report)?);
    } else {
        print!("{}", output::render_text(&report));
    }

    info!(
        resolved = report.resolved_count(),
        failed = report.failed_count(),
        total = report.outcomes.len(),
        "Resolution complete"
    );

    Ok(ExitCode::from(exit_status(
        report.resolved_count(),
        report.outcomes.len(),
    )))
}

fn build_options(args: &Args) -> ResolveOptions {
    let mut options = ResolveOptions::new().with_quality(args.quality);
    if let Some(proxy) = &args.proxy {
        options = options.with_proxy(proxy.clone());
    }
    if let Some(seconds) = args.timeout {
        options = options.with_timeout(Duration::from_secs(seconds));
    }
    for (name, value) in &args.headers {
        options = options.with_header(name.clone(), value.clone());
    }
    options
}

/// One URL per line; blank lines and `#` comments are skipped.
fn parse_url_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// 0 when every URL resolved, 1 when none did, 2 otherwise.
fn exit_status(resolved: usize, total: usize) -> u8 {
    if resolved == total {
        0
    } else if resolved == 0 {
        1
    } else {
        EXIT_PARTIAL
    }
}
