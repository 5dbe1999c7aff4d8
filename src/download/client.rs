//! HTTP client wrapper for downloading files.
//!
//! [`HttpClient`] streams a response body into a hidden sibling file
//! (`.{name}.{random}.part`) and renames it over the target once the body is
//! complete, so an interrupted transfer never leaves a truncated file under
//! the final name. The temporary file is opened with `create_new`, so it
//! never reuses a file that already exists, whether that is another download's
//! or a real sibling such as `notes.part`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::FileFetcher;
use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS, PARTIAL_SUFFIX};
use super::error::DownloadError;
use super::retry::{RetryPolicy, classify_error, rate_limit_delay};
use crate::moodle::redact_url;
use crate::user_agent;

/// HTTP client for downloading files with streaming support.
///
/// Create once and share; the inner connection pool is reused across
/// downloads.
///
/// # Example
///
/// ```no_run
/// use moodle_dump_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let bytes = client
///     .download_to_path("https://campus.example/tokenpluginfile.php/KEY/1/f.pdf", Path::new("f.pdf"))
///     .await?;
/// println!("Downloaded {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry_policy: RetryPolicy,
}

impl HttpClient {
    /// Creates a client with the default download timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS))
    }

    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DownloadError> {
        let client = base_client_builder(timeout)
            .build()
            .map_err(|source| DownloadError::Client { source })?;
        Ok(Self {
            client,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy used for retryable statuses.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Downloads `url` to `target`, replacing any existing file.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on invalid URL, network failure, timeout,
    /// a non-200 status after retries, or a local IO failure. No partial
    /// file is left behind on error.
    #[instrument(skip(self, url), fields(target = %target.display()))]
    pub async fn download_to_path(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        let shown_url = redact_url(url);
        Url::parse(url).map_err(|_| DownloadError::invalid_url(shown_url.clone()))?;

        let response = self.send_with_retry(url, &shown_url).await?;
        let partial = partial_path(target)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await
            .map_err(|e| DownloadError::io(partial.clone(), e))?;

        let written = match stream_to_file(&mut file, response, &shown_url, &partial).await {
            Ok(written) => written,
            Err(error) => {
                drop(file);
                debug!(path = %partial.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(error);
            }
        };
        drop(file);

        if let Err(error) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::io(target.to_path_buf(), error));
        }

        info!(url = %shown_url, bytes = written, "download complete");
        Ok(written)
    }

    async fn send_with_retry(
        &self,
        url: &str,
        shown_url: &str,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut attempt = 1;
        loop {
            let error = match self.send_request(url, shown_url).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            let Some(backoff) = self.retry_policy.next_delay(classify_error(&error), attempt)
            else {
                debug!(url = %shown_url, attempt, "giving up on download");
                return Err(error);
            };
            let delay = error.retry_after().unwrap_or(backoff);
            warn!(
                url = %shown_url,
                status = error.status(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                "retrying download"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_request(
        &self,
        url: &str,
        shown_url: &str,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(shown_url)
            } else {
                DownloadError::network(shown_url, e.without_url())
            }
        })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(DownloadError::http_status(
                shown_url,
                response.status().as_u16(),
                rate_limit_delay(&response),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl FileFetcher for HttpClient {
    async fn fetch(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        self.download_to_path(url, target).await
    }
}

/// Builder shared by the download and webservice clients.
pub(crate) fn base_client_builder(timeout: Duration) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-requested-with",
        HeaderValue::from_static(user_agent::MOBILE_APP_ID),
    );
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
        .timeout(timeout)
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .default_headers(headers)
}

fn partial_path(target: &Path) -> Result<PathBuf, DownloadError> {
    let Some(name) = target.file_name() else {
        return Err(DownloadError::io(
            target.to_path_buf(),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no file name"),
        ));
    };
    let tag: u32 = rand::thread_rng().r#gen();
    let mut partial_name = std::ffi::OsString::from(".");
    partial_name.push(name);
    partial_name.push(format!(".{tag:08x}{PARTIAL_SUFFIX}"));
    Ok(target.with_file_name(partial_name))
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    shown_url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(shown_url)
            } else {
                DownloadError::network(shown_url, e.without_url())
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
