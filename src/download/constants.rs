//! Constants for HTTP timeouts.

use std::time::Duration;

/// HTTP connect timeout.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default timeout for webservice calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for a whole file download.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Suffix of the temporary file a download streams into.
pub const PARTIAL_SUFFIX: &str = ".part";
