//! Bounded retry with exponential backoff.
//!
//! Webservice calls and file downloads share one [`RetryPolicy`]. Whether a
//! failure is worth another attempt is decided by [`classify_status`]: only
//! 429 and 500/502/503/504 are, so a 404 for a deleted resource or a 403 for
//! a restricted one fails on the first answer.
//!
//! ```
//! use moodle_dump_core::download::{RetryPolicy, classify_status};
//!
//! let policy = RetryPolicy::with_max_attempts(2);
//! assert!(policy.next_delay(classify_status(503), 1).is_some());
//! assert!(policy.next_delay(classify_status(503), 2).is_none());
//! assert!(policy.next_delay(classify_status(404), 1).is_none());
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::DownloadError;
use super::constants::MAX_RETRY_AFTER;

/// Attempts per request, first one included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(8);
const BACKOFF_FACTOR: f32 = 2.0;
const JITTER: Duration = Duration::from_millis(250);

/// How a failed request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Server-side hiccup (5xx gateway errors) or a dropped connection.
    Transient,
    /// HTTP 429; the server may name the delay in `Retry-After`.
    RateLimited,
    /// Anything another attempt will not fix.
    Permanent,
}

impl FailureType {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Attempt budget and backoff curve.
///
/// The wait after failed attempt `n` is
/// `min(base * factor^(n-1), cap)` plus up to `jitter` of random spread.
/// With the defaults that is about 0.5s and then 1s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    base: Duration,
    cap: Duration,
    factor: f32,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, BACKOFF_BASE, BACKOFF_CAP, BACKOFF_FACTOR)
    }
}

impl RetryPolicy {
    /// `attempts` counts the first request and is raised to at least 1.
    #[must_use]
    pub fn new(attempts: u32, base: Duration, cap: Duration, factor: f32) -> Self {
        Self {
            attempts: attempts.max(1),
            base,
            cap,
            factor,
            jitter: JITTER,
        }
    }

    /// Default curve with a custom attempt budget.
    #[must_use]
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self::new(attempts, BACKOFF_BASE, BACKOFF_CAP, BACKOFF_FACTOR)
    }

    #[must_use]
    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait before the attempt following `failed_attempt` (1-based).
    ///
    /// `None` means give up: the failure is permanent or the budget is spent.
    #[must_use]
    pub fn next_delay(&self, failure: FailureType, failed_attempt: u32) -> Option<Duration> {
        if !failure.is_retryable() {
            return None;
        }
        if failed_attempt >= self.attempts {
            debug!(attempts = self.attempts, "retry budget spent");
            return None;
        }
        Some(self.backoff(failed_attempt) + self.spread())
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = i32::try_from(failed_attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.base.as_millis() as f64 * f64::from(self.factor).powi(exponent);
        let capped = millis.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn spread(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Sorts an HTTP status into retryable or not.
#[must_use]
pub fn classify_status(status: u16) -> FailureType {
    match status {
        429 => FailureType::RateLimited,
        500 | 502 | 503 | 504 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Sorts a download failure.
///
/// Only status failures can be transient. Network errors and timeouts are
/// reported, not refetched.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_status(*status),
        _ => FailureType::Permanent,
    }
}

/// Parses `Retry-After` as delta-seconds or an HTTP-date.
///
/// Negative and past values give `None`; anything over an hour is capped.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    let delay = match value.parse::<i64>() {
        Ok(seconds) => Duration::from_secs(u64::try_from(seconds).ok()?),
        Err(_) => httpdate::parse_http_date(value)
            .ok()?
            .duration_since(std::time::SystemTime::now())
            .ok()?,
    };

    if delay > MAX_RETRY_AFTER {
        warn!(
            requested_secs = delay.as_secs(),
            "Retry-After too long, capping to one hour"
        );
        return Some(MAX_RETRY_AFTER);
    }
    Some(delay)
}

/// Server-requested delay carried by a 429 response, if any.
pub(crate) fn rate_limit_delay(response: &reqwest::Response) -> Option<Duration> {
    if response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}
