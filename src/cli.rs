//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use moodle_dump_core::Overrides;

/// Mirror your Moodle courses to local disk.
///
/// Logs in with the mobile webservice, lists your enrolled courses and
/// downloads every course file as course/section/module/file. Files that
/// already exist are skipped unless --force is given.
///
/// The password is read from MOODLE_PASSWORD (environment or .env file).
#[derive(Parser, Debug)]
#[command(name = "moodle-dump")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Re-download files that already exist locally
    #[arg(long)]
    pub force: bool,

    /// Root directory of the mirror [default: dumps]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/moodle-dump/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Site base URL (overrides MOODLE_SITE)
    #[arg(long, value_name = "URL")]
    pub site: Option<String>,

    /// Login name (overrides MOODLE_USERNAME)
    #[arg(long)]
    pub username: Option<String>,

    /// Only mirror this course id (repeatable)
    #[arg(long = "course", value_name = "ID")]
    pub courses: Vec<i64>,

    /// Numbered layout with JSON metadata next to the files
    #[arg(long)]
    pub dump_all: bool,

    /// Also replace whitespace runs with underscores in names
    #[arg(long)]
    pub full_sanitizer: bool,

    /// Maximum concurrent downloads (1-16) [default: 1]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per request for transient failures (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Webservice request timeout in seconds (1-3600) [default: 30]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Per-file download timeout in seconds (1-3600) [default: 60]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub download_timeout: Option<u64>,
}

impl Args {
    /// Settings given on the command line.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            site: self.site.clone(),
            username: self.username.clone(),
            output_dir: self.output_dir.clone(),
            full_sanitizer: self.full_sanitizer,
            dump_all: self.dump_all,
            concurrency: self.concurrency.map(usize::from),
            max_retries: self.max_retries.map(u32::from),
            timeout_secs: self.timeout,
            download_timeout_secs: self.download_timeout,
            courses: self.courses.clone(),
        }
    }
}
