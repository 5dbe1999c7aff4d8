//! CLI entry point for moodle-dump.

use std::process::ExitCode;

use tracing::error;

mod app;
mod cli;

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// The walk completed; per-file failures are only reported.
    Success,
    /// A precondition failed: configuration, login, site info or courses.
    Failure,
    /// Stopped by Ctrl-C.
    Interrupted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Interrupted => 130,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let exit = match app::runtime::run().await {
        Ok(exit) => exit,
        Err(err) => {
            error!("{err:#}");
            ProcessExit::Failure
        }
    };
    ExitCode::from(exit.code())
}
