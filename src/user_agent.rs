//! Shared request identification for webservice and download traffic.

/// Value of the `X-Requested-With` header the mobile webservice expects.
pub(crate) const MOBILE_APP_ID: &str = "com.moodle.moodlemobile";

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/moodle-dump";

/// Default User-Agent for every request (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("moodle-dump/{version} (course-mirror; +{PROJECT_UA_URL})")
}
