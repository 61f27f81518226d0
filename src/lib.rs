//! Media Resolver Library
//!
//! Turns a social-media post URL into a normalized description of the
//! downloadable media behind it: direct file URLs, synthesized filenames,
//! required request headers, and basic post metadata. Nothing is downloaded;
//! [`open_stream`] hands a resolved item to callers that want the bytes.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transport`] - Per-call HTTP client with deadline, proxy, and error translation
//! - [`extractor`] - One extraction strategy per platform plus the error boundary
//! - [`router`] - Ordered host rules with lazily created, shared strategies
//! - [`resolver`] - Facade that routes, builds the call context, and reports to an observer
//! - [`batch`] - Bounded-concurrency resolution with per-URL failure isolation
//! - [`quality`] - Quality hints and rendition selection
//! - [`stream`] - Byte streams for resolved items
//!
//! # Example
//!
//! ```no_run
//! use media_resolver::{Quality, ResolveOptions};
//!
//! # async fn example() -> Result<(), media_resolver::ExtractError> {
//! let options = ResolveOptions::new().with_quality(Quality::High);
//! let result = media_resolver::resolve("https://vimeo.com/76979871", &options).await?;
//! for item in result.urls() {
//!     println!("{} -> {}", item.filename(), item.url());
//! }
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod context;
pub mod error;
pub mod extractor;
pub mod filename;
pub mod media;
pub mod observe;
pub mod platform;
pub mod quality;
pub mod resolver;
pub mod retry;
pub mod router;
pub mod stream;
pub mod transport;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use batch::{
    BatchError, BatchOutcome, BatchReport, BatchResolver, BatchStatus, DEFAULT_CONCURRENCY,
};
pub use context::{DEFAULT_TIMEOUT, ResolveContext, ResolveOptions};
pub use error::ExtractError;
pub use extractor::{Endpoints, Extractor, run_extractor};
pub use media::{MediaItem, MediaMeta, MediaResult, MediaType};
pub use observe::{NoopObserver, ResolveObserver, TracingObserver};
pub use platform::Platform;
pub use quality::{Quality, UnknownQuality};
pub use resolver::{MediaResolver, resolve, resolve_many};
pub use retry::{RetryPolicy, with_retry};
pub use router::{HostRule, RouteMatch, Router};
pub use stream::{MediaStream, open_stream};
pub use user_agent::DEFAULT_USER_AGENT;
