//! Path segment sanitization for remote-supplied names.
//!
//! Course, section, module and file names come straight from the remote
//! service and are untrusted. [`sanitize`] maps any string to a single
//! bounded path segment that is safe to join onto a local directory.

/// Default maximum length (in characters) of a sanitized segment.
pub const DEFAULT_MAX_LEN: usize = 80;

/// Fallback segment used when sanitization leaves nothing behind.
const EMPTY_FALLBACK: &str = "item";

/// Whitespace handling mode for [`sanitize_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Keep interior whitespace as-is.
    #[default]
    Basic,
    /// Collapse every whitespace run into a single `_`.
    Full,
}

/// Sanitizes `name` in [`SanitizeMode::Basic`] mode.
///
/// # Example
///
/// ```
/// use moodle_dump_core::layout::sanitize;
///
/// assert_eq!(sanitize("Tema 1: Intro?", 80), "Tema 1_ Intro_");
/// assert_eq!(sanitize("   ", 80), "item");
/// ```
#[must_use]
pub fn sanitize(name: &str, max_len: usize) -> String {
    sanitize_with(name, max_len, SanitizeMode::Basic)
}

/// Sanitizes `name` into a single filesystem-safe path segment.
///
/// Steps, in order: trim surrounding whitespace, replace reserved characters
/// (`< > : " / \ | ? *`) and control characters `0x00..=0x1F` with `_`,
/// collapse whitespace runs in [`SanitizeMode::Full`], strip trailing spaces
/// and dots, truncate to `max_len` characters and strip again. An empty
/// result becomes `"item"`.
///
/// Separators never survive and `.`/`..` collapse to `"item"`, so the output
/// cannot escape the directory it is joined onto.
#[must_use]
pub fn sanitize_with(name: &str, max_len: usize, mode: SanitizeMode) -> String {
    let replaced: String = name.trim().chars().map(replace_reserved).collect();

    let collapsed = match mode {
        SanitizeMode::Basic => replaced,
        SanitizeMode::Full => collapse_whitespace(&replaced),
    };

    let mut out = strip_trailing(&collapsed).to_string();
    if out.chars().count() > max_len {
        let truncated: String = out.chars().take(max_len).collect();
        out = strip_trailing(&truncated).to_string();
    }

    if out.is_empty() {
        EMPTY_FALLBACK.to_string()
    } else {
        out
    }
}

fn replace_reserved(c: char) -> char {
    match c {
        '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
        '\u{0}'..='\u{1f}' => '_',
        c => c,
    }
}

fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

fn strip_trailing(value: &str) -> &str {
    value.trim_end_matches([' ', '.'])
}
