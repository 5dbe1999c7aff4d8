//! Run settings.
//!
//! Resolution order, highest first:
//! 1. CLI overrides
//! 2. Environment variables (`MOODLE_SITE`, `MOODLE_USERNAME`, `MOODLE_PASSWORD`)
//! 3. TOML config file
//! 4. Defaults
//!
//! The password is only ever read from the environment.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::download::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::sync::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

pub const ENV_SITE: &str = "MOODLE_SITE";
pub const ENV_USERNAME: &str = "MOODLE_USERNAME";
pub const ENV_PASSWORD: &str = "MOODLE_PASSWORD";

/// Output root used when nothing else is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "dumps";

const CONFIG_DIR_NAME: &str = "moodle-dump";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration failures. All are fatal before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{name}`: {hint}")]
    MissingSetting {
        name: &'static str,
        hint: &'static str,
    },

    #[error("failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid alias key `{key}`: expected a numeric course id")]
    InvalidAlias { key: String },

    #[error("invalid value for `{name}`: {value}. Expected range: {expected}")]
    InvalidValue {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Contents of `config.toml`.
///
/// ```toml
/// site = "https://campus.example"
/// username = "student"
/// output_dir = "dumps"
/// concurrency = 2
///
/// [aliases]
/// 1678 = "FMI"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub site: Option<String>,
    pub username: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub full_sanitizer: Option<bool>,
    pub dump_all: Option<bool>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    /// Course id (as a string key) to folder name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl FileConfig {
    /// Parses TOML text; `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or unknown keys.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Like [`FileConfig::load`], returning `None` when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be used.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/moodle-dump/config.toml`
/// 2. `$HOME/.config/moodle-dump/config.toml`
#[must_use]
pub fn resolve_default_config_path(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let non_empty = |name: &str| env(name).filter(|value| !value.is_empty());

    if let Some(xdg_config_home) = non_empty("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = non_empty("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

/// Values given on the command line. `None`/`false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub site: Option<String>,
    pub username: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub full_sanitizer: bool,
    pub dump_all: bool,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub courses: Vec<i64>,
}

/// Fully resolved settings for one run.
#[derive(Clone)]
pub struct Settings {
    pub site: String,
    pub username: String,
    pub password: String,
    pub output_dir: PathBuf,
    pub aliases: HashMap<i64, String>,
    pub full_sanitizer: bool,
    /// Numbered layout plus JSON metadata sidecars.
    pub dump_all: bool,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout: Duration,
    pub download_timeout: Duration,
    /// Only these course ids are mirrored when non-empty.
    pub courses: Vec<i64>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("site", &self.site)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("output_dir", &self.output_dir)
            .field("aliases", &self.aliases)
            .field("full_sanitizer", &self.full_sanitizer)
            .field("dump_all", &self.dump_all)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("download_timeout", &self.download_timeout)
            .field("courses", &self.courses)
            .finish()
    }
}

impl Settings {
    /// Merges CLI overrides, environment and file config.
    ///
    /// `env` looks up environment variables; empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing credentials, out-of-range values
    /// or non-numeric alias keys.
    pub fn resolve(
        overrides: &Overrides,
        file: Option<&FileConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let default_file = FileConfig::default();
        let file = file.unwrap_or(&default_file);
        let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let site = overrides
            .site
            .clone()
            .or_else(|| env(ENV_SITE))
            .or_else(|| file.site.clone())
            .map(|site| site.trim().trim_end_matches('/').to_string())
            .filter(|site| !site.is_empty())
            .ok_or(ConfigError::MissingSetting {
                name: "site",
                hint: "pass --site, set MOODLE_SITE or add `site` to the config file",
            })?;

        let username = overrides
            .username
            .clone()
            .or_else(|| env(ENV_USERNAME))
            .or_else(|| file.username.clone())
            .filter(|username| !username.is_empty())
            .ok_or(ConfigError::MissingSetting {
                name: "username",
                hint: "pass --username, set MOODLE_USERNAME or add `username` to the config file",
            })?;

        let password = env(ENV_PASSWORD).ok_or(ConfigError::MissingSetting {
            name: "password",
            hint: "set MOODLE_PASSWORD in the environment or a .env file",
        })?;

        let concurrency = overrides
            .concurrency
            .or(file.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        check_range("concurrency", concurrency, 1, MAX_CONCURRENCY, "1..=16")?;

        let max_retries = overrides
            .max_retries
            .or(file.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        check_range("max_retries", max_retries, 1, 10, "1..=10")?;

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        check_range("timeout_secs", timeout_secs, 1, 3600, "1..=3600")?;

        let download_timeout_secs = overrides
            .download_timeout_secs
            .or(file.download_timeout_secs)
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        check_range(
            "download_timeout_secs",
            download_timeout_secs,
            1,
            3600,
            "1..=3600",
        )?;

        Ok(Self {
            site,
            username,
            password,
            output_dir: overrides
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            aliases: parse_aliases(&file.aliases)?,
            full_sanitizer: overrides.full_sanitizer || file.full_sanitizer.unwrap_or(false),
            dump_all: overrides.dump_all || file.dump_all.unwrap_or(false),
            concurrency,
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
            download_timeout: Duration::from_secs(download_timeout_secs),
            courses: overrides.courses.clone(),
        })
    }
}

fn check_range<T>(
    name: &'static str,
    value: T,
    min: T,
    max: T,
    expected: &'static str,
) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            expected,
        });
    }
    Ok(())
}

fn parse_aliases(raw: &BTreeMap<String, String>) -> Result<HashMap<i64, String>, ConfigError> {
    raw.iter()
        .map(|(key, name)| {
            key.trim()
                .parse::<i64>()
                .map(|id| (id, name.clone()))
                .map_err(|_| ConfigError::InvalidAlias { key: key.clone() })
        })
        .collect()
}
