//! HTTP file downloads and the shared retry policy.
//!
//! # Features
//!
//! - Streaming downloads into a `.part` file, renamed into place on success
//! - Bounded retry of 429/5xx statuses with exponential backoff and jitter
//! - `Retry-After` honoured on 429 responses
//! - Structured error types with full context
//!
//! The sync engine depends on the [`FileFetcher`] seam rather than on
//! [`HttpClient`] directly, so tests can substitute an in-memory fetcher.

mod client;
mod constants;
mod error;
mod retry;

use std::path::Path;

use async_trait::async_trait;

pub use client::HttpClient;
pub(crate) use client::base_client_builder;
pub use constants::{DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::DownloadError;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryPolicy, classify_error, classify_status,
    parse_retry_after,
};
pub(crate) use retry::rate_limit_delay;

/// Fetches one remote file to a local path.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Downloads `url` to `target`, replacing existing content.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, target: &Path) -> Result<u64, DownloadError>;
}
