use moodle_dump_core::SyncReport;
use moodle_dump_core::sync::CourseOutcome;
use tracing::{info, warn};

/// Logs the end-of-run summary and every recorded failure.
pub(crate) fn log_report(report: &SyncReport) {
    for course in &report.courses {
        if let CourseOutcome::Failed { reason, status } = &course.outcome {
            warn!(
                course_id = course.course_id,
                folder = %course.folder,
                status,
                reason = %reason,
                "course not mirrored"
            );
        }
    }

    for file in report.failed_files() {
        warn!(
            course_id = file.course_id,
            module = %file.module,
            path = %file.path.display(),
            outcome = ?file.outcome,
            "file not downloaded"
        );
    }

    for failure in &report.directory_failures {
        warn!(path = %failure.path().display(), error = %failure, "directory skipped");
    }

    let summary = report.summary();
    info!(
        courses = report.courses.len(),
        courses_failed = summary.courses_failed,
        courses_empty = summary.courses_empty,
        downloaded = summary.downloaded,
        bytes = summary.bytes_downloaded,
        skipped_existing = summary.skipped_existing,
        skipped_no_access = summary.skipped_no_access,
        failed = summary.failed,
        directory_failures = summary.directory_failures,
        "Mirror complete"
    );

    if report.interrupted {
        warn!("Run interrupted; in-flight downloads were allowed to finish");
    }
}
