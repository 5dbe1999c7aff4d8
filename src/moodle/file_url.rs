//! Rewriting of webservice file URLs into direct-download URLs.
//!
//! File URLs in course contents point at `/webservice/pluginfile.php/...`,
//! which needs the access token as a query parameter. The same file is
//! reachable without query credentials through
//! `/tokenpluginfile.php/{private_access_key}/...`.

use url::Url;

use super::types::redact;

/// Path marker present in webservice file URLs.
pub const WEBSERVICE_PLUGINFILE: &str = "/webservice/pluginfile.php/";

const TOKEN_PLUGINFILE: &str = "/tokenpluginfile.php/";

/// Converts a webservice file URL into an authenticated direct-download URL.
///
/// Returns `None` when either input is empty or the URL does not parse.
/// Only the first occurrence of the marker is replaced, and the query string
/// and fragment are dropped. A URL without the marker keeps its path
/// unchanged; use [`has_webservice_marker`] to detect that case.
///
/// # Example
///
/// ```
/// use moodle_dump_core::moodle::to_authenticated_url;
///
/// let url = to_authenticated_url(
///     "https://x/webservice/pluginfile.php/5/mod_resource/content/0/f.pdf?x=1",
///     "KEY",
/// );
/// assert_eq!(
///     url.as_deref(),
///     Some("https://x/tokenpluginfile.php/KEY/5/mod_resource/content/0/f.pdf")
/// );
/// ```
#[must_use]
pub fn to_authenticated_url(file_url: &str, access_key: &str) -> Option<String> {
    if file_url.is_empty() || access_key.is_empty() {
        return None;
    }

    let mut parsed = Url::parse(file_url).ok()?;
    let replacement = format!("{TOKEN_PLUGINFILE}{access_key}/");
    let new_path = parsed.path().replacen(WEBSERVICE_PLUGINFILE, &replacement, 1);

    parsed.set_path(&new_path);
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Shortens the access key inside a rewritten URL so it can be logged.
#[must_use]
pub fn redact_url(url: &str) -> String {
    let Some(start) = url.find(TOKEN_PLUGINFILE) else {
        return url.to_string();
    };
    let key_start = start + TOKEN_PLUGINFILE.len();
    let rest = &url[key_start..];
    let key_end = rest.find('/').unwrap_or(rest.len());
    format!(
        "{}{}{}",
        &url[..key_start],
        redact(&rest[..key_end]),
        &rest[key_end..]
    )
}

/// Returns true when `file_url`'s path contains the webservice marker.
#[must_use]
pub fn has_webservice_marker(file_url: &str) -> bool {
    Url::parse(file_url)
        .map(|parsed| parsed.path().contains(WEBSERVICE_PLUGINFILE))
        .unwrap_or(false)
}
