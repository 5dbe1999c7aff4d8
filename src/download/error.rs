//! Per-file download failures.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why one file could not be mirrored.
///
/// URLs stored here are already redacted; the access key never appears in
/// a message.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("cannot build download client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    /// DNS, connect, TLS or body read failure.
    #[error("cannot fetch {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no response from {url} within the download timeout")]
    Timeout { url: String },

    /// Any status other than 200.
    #[error("{url} answered HTTP {status}")]
    HttpStatus {
        url: String,
        status: u16,
        /// Parsed `Retry-After` of a 429 response.
        retry_after: Option<Duration>,
    },

    #[error("cannot write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a valid file URL: {url}")]
    InvalidUrl { url: String },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16, retry_after: Option<Duration>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// HTTP status, for status failures only.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-requested delay before the next attempt.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_carries_status_and_delay() {
        let error = DownloadError::http_status(
            "https://m.example/tokenpluginfile.php/abcdef.../1/a.pdf",
            429,
            Some(Duration::from_secs(7)),
        );
        assert_eq!(error.status(), Some(429));
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
        assert!(error.to_string().contains("HTTP 429"));
    }

    #[test]
    fn test_non_status_errors_have_no_status() {
        let io = DownloadError::io(
            "/mirror/Intro/a.pdf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(io.status(), None);
        assert_eq!(io.retry_after(), None);
        assert!(io.to_string().contains("/mirror/Intro/a.pdf"));

        let timeout = DownloadError::timeout("https://m.example/f");
        assert_eq!(timeout.status(), None);
        assert!(timeout.to_string().contains("timeout"));
    }

    #[test]
    fn test_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        assert_eq!(error.to_string(), "not a valid file URL: not-a-url");
    }
}
