//! Per-run outcome records.

use std::path::PathBuf;

use super::error::FilesystemError;

/// What happened to one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Fetched and written.
    Downloaded { bytes: u64 },
    /// Target already existed and `force` was off.
    SkippedExisting,
    /// No usable access key or URL; nothing was fetched.
    SkippedNoAccess,
    /// The fetch failed; `status` is set for HTTP failures.
    Failed { reason: String, status: Option<u16> },
}

/// Outcome for one file, with enough context to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub course_id: i64,
    /// Remote module name.
    pub module: String,
    /// Local target path.
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// What happened to one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseOutcome {
    /// Tree walked; individual file outcomes are in the file records.
    Synced,
    /// The course has no sections.
    NoContent,
    /// Hidden courses are never mirrored.
    SkippedHidden,
    /// Contents could not be fetched or the course directory not created.
    Failed { reason: String, status: Option<u16> },
    /// The walk stopped inside this course.
    Interrupted,
}

/// Outcome for one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRecord {
    pub course_id: i64,
    /// Local folder name.
    pub folder: String,
    pub outcome: CourseOutcome,
}

/// Everything a sync run did, in walk order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub courses: Vec<CourseRecord>,
    pub files: Vec<FileRecord>,
    pub directory_failures: Vec<FilesystemError>,
    /// Set when cancellation stopped the walk early.
    pub interrupted: bool,
}

/// Counters derived from a [`SyncReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub courses_synced: usize,
    pub courses_failed: usize,
    pub courses_empty: usize,
    pub downloaded: usize,
    pub bytes_downloaded: u64,
    pub skipped_existing: usize,
    pub skipped_no_access: usize,
    pub failed: usize,
    pub directory_failures: usize,
}

impl SyncReport {
    #[must_use]
    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary {
            directory_failures: self.directory_failures.len(),
            ..SyncSummary::default()
        };

        for course in &self.courses {
            match course.outcome {
                CourseOutcome::Synced => summary.courses_synced += 1,
                CourseOutcome::Failed { .. } => summary.courses_failed += 1,
                CourseOutcome::NoContent => summary.courses_empty += 1,
                CourseOutcome::SkippedHidden | CourseOutcome::Interrupted => {}
            }
        }

        for file in &self.files {
            match file.outcome {
                FileOutcome::Downloaded { bytes } => {
                    summary.downloaded += 1;
                    summary.bytes_downloaded += bytes;
                }
                FileOutcome::SkippedExisting => summary.skipped_existing += 1,
                FileOutcome::SkippedNoAccess => summary.skipped_no_access += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
        }

        summary
    }

    /// File records that failed.
    pub fn failed_files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, FileOutcome::Failed { .. }))
    }
}
