//! Exit code logic for the moodle-dump process.
//!
//! Single responsibility: map a finished sync to the process exit outcome.
//! Individual file or course failures do not change the exit status.

use moodle_dump_core::SyncReport;

use crate::ProcessExit;

pub(crate) fn determine_exit_outcome(report: &SyncReport) -> ProcessExit {
    if report.interrupted {
        ProcessExit::Interrupted
    } else {
        ProcessExit::Success
    }
}
