//! Error types for webservice calls.
//!
//! Outcomes are classified once, at the client boundary. Callers match on
//! variants instead of probing raw JSON for `error`/`exception` keys.

use thiserror::Error;

/// Request-level failure before any HTTP status was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("cannot build HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the configured timeout.
    #[error("timeout calling {url}")]
    Timeout {
        /// Endpoint that timed out.
        url: String,
    },

    /// DNS, TCP or TLS connection failure.
    #[error("cannot connect to {url}: {source}")]
    Connect {
        /// Endpoint that could not be reached.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Any other request or body-read failure.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Classifies a reqwest error for `url`.
    ///
    /// The URL recorded inside `source` is dropped since it may carry the
    /// access token in its query string.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        let source = source.without_url();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_connect() {
            Self::Connect { url, source }
        } else {
            Self::Request { url, source }
        }
    }

    /// Timeouts and connection failures may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connect { .. })
    }
}

/// Login failures. Always fatal to a run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Token endpoint answered with a non-200 status.
    #[error("login failed with HTTP {status}: {body}")]
    HttpStatus {
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Token endpoint body was not JSON.
    #[error("login returned invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    /// The site rejected the credentials or the service.
    #[error("login rejected: {message}{}", code_suffix(.error_code.as_deref()))]
    Rejected {
        message: String,
        error_code: Option<String>,
    },

    /// Response parsed but carried no token.
    #[error("login response did not include a token")]
    MissingToken,
}

/// Webservice function failures. Terminal for the call; the caller decides
/// whether to skip the affected course or abort.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No successful login has happened on this client.
    #[error("cannot call {function}: not logged in")]
    NotAuthenticated { function: String },

    #[error("transport failure calling {function}: {source}")]
    Transport {
        function: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP {status} calling {function}: {body}")]
    HttpStatus {
        function: String,
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    #[error("invalid JSON from {function}: {source}")]
    InvalidJson {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    /// The remote side returned an exception envelope.
    #[error("{function} raised {exception}{}: {message}", code_suffix(.error_code.as_deref()))]
    Exception {
        function: String,
        exception: String,
        error_code: Option<String>,
        message: String,
    },

    /// JSON was valid but did not match the expected payload.
    #[error("unexpected payload from {function}: {source}")]
    UnexpectedShape {
        function: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Returns the HTTP status for status failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn code_suffix(code: Option<&str>) -> String {
    code.map(|code| format!(" ({code})")).unwrap_or_default()
}

/// Maximum number of characters of a response body kept in errors.
const BODY_EXCERPT_CHARS: usize = 200;

pub(crate) fn body_excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_rejected_display_includes_code() {
        let error = AuthError::Rejected {
            message: "Invalid login, please try again".to_string(),
            error_code: Some("invalidlogin".to_string()),
        };
        let msg = error.to_string();
        assert!(msg.contains("Invalid login"), "{msg}");
        assert!(msg.contains("(invalidlogin)"), "{msg}");
    }

    #[test]
    fn test_auth_rejected_display_without_code() {
        let error = AuthError::Rejected {
            message: "nope".to_string(),
            error_code: None,
        };
        assert_eq!(error.to_string(), "login rejected: nope");
    }

    #[test]
    fn test_api_exception_display() {
        let error = ApiError::Exception {
            function: "core_course_get_contents".to_string(),
            exception: "moodle_exception".to_string(),
            error_code: Some("requireloginerror".to_string()),
            message: "Course or activity not accessible.".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.starts_with("core_course_get_contents raised moodle_exception"));
        assert!(msg.contains("(requireloginerror)"));
        assert!(msg.contains("not accessible"));
    }

    #[test]
    fn test_api_status_accessor() {
        let error = ApiError::HttpStatus {
            function: "f".to_string(),
            status: 503,
            body: String::new(),
        };
        assert_eq!(error.status(), Some(503));
        let error = ApiError::NotAuthenticated {
            function: "f".to_string(),
        };
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_transport_timeout_is_retryable() {
        let error = TransportError::Timeout {
            url: "https://m/login/token.php".to_string(),
        };
        assert!(error.is_retryable());
        assert!(error.to_string().contains("timeout"));
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let body = "x".repeat(1000);
        assert_eq!(body_excerpt(&body).len(), 200);
    }
}
