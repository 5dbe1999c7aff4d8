use anyhow::{Context, Result};
use moodle_dump_core::config::resolve_default_config_path;
use moodle_dump_core::{FileConfig, Settings};
use tracing::debug;

use crate::cli::Args;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Loads the config file (explicit path must exist) and resolves settings.
pub(crate) fn load_settings(args: &Args) -> Result<Settings> {
    let file_config = match &args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => match resolve_default_config_path(env_var) {
            Some(path) => {
                let loaded = FileConfig::load_optional(&path)?;
                if loaded.is_some() {
                    debug!(path = %path.display(), "loaded config file");
                }
                loaded
            }
            None => None,
        },
    };

    Settings::resolve(&args.overrides(), file_config.as_ref(), env_var)
        .context("Invalid configuration")
}
