//! Moodle course mirror library.
//!
//! Logs into a Moodle site through its mobile webservice, enumerates the
//! user's enrolled courses and mirrors every course's files onto disk as
//! `course/section/module/file`, skipping files that are already present.
//!
//! # Architecture
//!
//! - [`config`] - Settings from CLI overrides, environment and TOML file
//! - [`download`] - Streaming file downloads and the shared retry policy
//! - [`layout`] - Name sanitization and deterministic local paths
//! - [`moodle`] - Webservice client, payload types and URL rewriting
//! - [`sync`] - Tree walker producing a per-file report

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod layout;
pub mod moodle;
pub mod sync;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, Overrides, Settings};
pub use download::{DownloadError, FileFetcher, HttpClient, RetryPolicy};
pub use layout::{Layout, sanitize};
pub use moodle::{ApiError, AuthError, ContentSource, Course, WebserviceClient};
pub use sync::{SyncEngine, SyncOptions, SyncReport};
