//! Tree walker that mirrors course content onto disk.
//!
//! # Concurrency Model
//!
//! - The walk (content fetch, directory creation, metadata) is sequential
//! - Each file becomes a Tokio task, spawned only after its module directory
//!   exists and a semaphore permit is held
//! - A per-path async mutex covers the exists-check and the write, so two
//!   tasks never write the same target at once
//! - With the default concurrency of 1 downloads run strictly one at a time
//!
//! Cancellation is cooperative: the shared flag is checked at course,
//! section, module and file boundaries. Downloads already in flight finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::error::{EngineError, FilesystemError};
use super::report::{CourseOutcome, CourseRecord, FileOutcome, FileRecord, SyncReport};
use crate::download::FileFetcher;
use crate::layout::Layout;
use crate::moodle::{
    ContentSource, Course, FileContent, Module, has_webservice_marker, redact_url,
    to_authenticated_url,
};

/// Default number of simultaneous downloads.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 16;

const COURSE_METADATA: &str = "contents.json";
const SECTION_METADATA: &str = "section.json";
const MODULE_METADATA: &str = "module.json";

/// Tunables for a [`SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Simultaneous downloads (1..=16).
    pub concurrency: usize,
    /// Write `contents.json`, `section.json` and `module.json` sidecars.
    pub write_metadata: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            write_metadata: false,
        }
    }
}

type PathLocks = Arc<DashMap<PathBuf, Arc<Mutex<()>>>>;

/// Mirrors enrolled courses into a local directory tree.
pub struct SyncEngine {
    source: Arc<dyn ContentSource>,
    fetcher: Arc<dyn FileFetcher>,
    layout: Layout,
    access_key: Option<String>,
    options: SyncOptions,
    semaphore: Arc<Semaphore>,
    path_locks: PathLocks,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("layout", &self.layout)
            .field("has_access_key", &self.access_key.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// One file handed to a download task.
struct FileJob {
    course_id: i64,
    module: String,
    file_url: String,
    target: PathBuf,
    force: bool,
}

impl SyncEngine {
    /// Creates an engine.
    ///
    /// `access_key` is the per-user private access key; without it every
    /// file is recorded as skipped-no-access.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `options.concurrency`
    /// is outside 1..=16.
    #[instrument(level = "debug", skip(source, fetcher, layout, access_key))]
    pub fn new(
        source: Arc<dyn ContentSource>,
        fetcher: Arc<dyn FileFetcher>,
        layout: Layout,
        access_key: Option<String>,
        options: SyncOptions,
    ) -> Result<Self, EngineError> {
        if !(1..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: options.concurrency,
            });
        }

        let access_key = access_key.filter(|key| !key.is_empty());
        debug!(
            concurrency = options.concurrency,
            numbered = layout.is_numbered(),
            has_access_key = access_key.is_some(),
            "creating sync engine"
        );

        Ok(Self {
            source,
            fetcher,
            layout,
            access_key,
            semaphore: Arc::new(Semaphore::new(options.concurrency)),
            options,
            path_locks: Arc::new(DashMap::new()),
        })
    }

    /// Mirrors `courses` under `root`.
    ///
    /// Existing files are skipped unless `force` is set. Individual failures
    /// are recorded in the report and never abort the run.
    pub async fn sync(&self, courses: &[Course], root: &Path, force: bool) -> SyncReport {
        self.sync_interruptible(courses, root, force, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Like [`SyncEngine::sync`], stopping early once `interrupted` is set.
    #[instrument(skip(self, courses, interrupted), fields(root = %root.display(), courses = courses.len()))]
    pub async fn sync_interruptible(
        &self,
        courses: &[Course],
        root: &Path,
        force: bool,
        interrupted: Arc<AtomicBool>,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let mut handles = Vec::new();

        info!(force, "starting sync");

        for course in courses {
            if is_cancelled(&interrupted) {
                break;
            }

            let folder = self.layout.course_folder(course);
            if course.hidden {
                debug!(course_id = course.id, "skipping hidden course");
                report.courses.push(CourseRecord {
                    course_id: course.id,
                    folder,
                    outcome: CourseOutcome::SkippedHidden,
                });
                continue;
            }

            let outcome = self
                .sync_course(
                    course,
                    root,
                    &folder,
                    force,
                    &interrupted,
                    &mut report,
                    &mut handles,
                )
                .await;
            report.courses.push(CourseRecord {
                course_id: course.id,
                folder,
                outcome,
            });
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");
        for handle in handles {
            match handle.await {
                Ok(record) => report.files.push(record),
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        report.interrupted = is_cancelled(&interrupted);

        let summary = report.summary();
        info!(
            downloaded = summary.downloaded,
            bytes = summary.bytes_downloaded,
            skipped_existing = summary.skipped_existing,
            skipped_no_access = summary.skipped_no_access,
            failed = summary.failed,
            courses_failed = summary.courses_failed,
            interrupted = report.interrupted,
            "sync complete"
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(course_id = course.id, folder = %folder))]
    async fn sync_course(
        &self,
        course: &Course,
        root: &Path,
        folder: &str,
        force: bool,
        interrupted: &AtomicBool,
        report: &mut SyncReport,
        handles: &mut Vec<JoinHandle<FileRecord>>,
    ) -> CourseOutcome {
        let course_dir = root.join(folder);
        if let Err(error) = create_dir(&course_dir).await {
            warn!(error = %error, "cannot create course directory, skipping course");
            let outcome = CourseOutcome::Failed {
                reason: error.to_string(),
                status: None,
            };
            report.directory_failures.push(error);
            return outcome;
        }

        let contents = match self.source.course_contents(course.id).await {
            Ok(contents) => contents,
            Err(error) => {
                warn!(error = %error, "cannot fetch course contents, skipping course");
                return CourseOutcome::Failed {
                    reason: error.to_string(),
                    status: error.status(),
                };
            }
        };

        if contents.is_empty() {
            info!("course has no content");
            return CourseOutcome::NoContent;
        }

        self.write_metadata(&course_dir.join(COURSE_METADATA), Some(contents.raw()))
            .await;

        let sections_dir = match self.layout.sections_root() {
            Some(name) => {
                let dir = course_dir.join(name);
                if let Err(error) = create_dir(&dir).await {
                    warn!(error = %error, "cannot create sections directory");
                    let outcome = CourseOutcome::Failed {
                        reason: error.to_string(),
                        status: None,
                    };
                    report.directory_failures.push(error);
                    return outcome;
                }
                dir
            }
            None => course_dir,
        };

        for (section_index, section) in contents.sections.iter().enumerate() {
            if is_cancelled(interrupted) {
                return CourseOutcome::Interrupted;
            }

            let section_dir = sections_dir.join(self.layout.section_folder(section));
            if let Err(error) = create_dir(&section_dir).await {
                warn!(section = %section.name, error = %error, "cannot create section directory");
                report.directory_failures.push(error);
                continue;
            }
            self.write_metadata(
                &section_dir.join(SECTION_METADATA),
                contents.raw_section(section_index),
            )
            .await;

            for (position, module) in section.modules.iter().enumerate() {
                if is_cancelled(interrupted) {
                    return CourseOutcome::Interrupted;
                }

                let module_dir = section_dir.join(self.layout.module_folder(position, module));
                if let Err(error) = create_dir(&module_dir).await {
                    warn!(module = %module.name, error = %error, "cannot create module directory");
                    report.directory_failures.push(error);
                    continue;
                }
                self.write_metadata(
                    &module_dir.join(MODULE_METADATA),
                    contents.raw_module(section_index, position),
                )
                .await;

                for file in module.contents.iter().filter_map(|item| item.as_file()) {
                    if is_cancelled(interrupted) {
                        return CourseOutcome::Interrupted;
                    }

                    let target = self
                        .layout
                        .resolve(course, section, position, module, &file.filename)
                        .to_path(root);
                    let job = FileJob {
                        course_id: course.id,
                        module: module.name.clone(),
                        file_url: file.file_url.clone(),
                        target,
                        force,
                    };
                    handles.push(self.spawn_file_job(job, file, module).await);
                }
            }
        }

        CourseOutcome::Synced
    }

    async fn spawn_file_job(
        &self,
        job: FileJob,
        file: &FileContent,
        module: &Module,
    ) -> JoinHandle<FileRecord> {
        if !file.file_url.is_empty() && !has_webservice_marker(&file.file_url) {
            warn!(
                module = %module.name,
                file = %file.filename,
                "file URL lacks the webservice marker, using it unchanged"
            );
        }

        // The semaphore is never closed, so this only fails if that changes.
        let permit = self.semaphore.clone().acquire_owned().await.ok();
        let fetcher = Arc::clone(&self.fetcher);
        let path_locks = Arc::clone(&self.path_locks);
        let access_key = self.access_key.clone();

        tokio::spawn(async move {
            // Permit is released when the task finishes.
            let _permit = permit;
            process_file(job, access_key.as_deref(), fetcher.as_ref(), &path_locks).await
        })
    }

    /// Writes the remote JSON for one tree node when metadata output is
    /// enabled.
    ///
    /// Failures are logged only.
    async fn write_metadata(&self, path: &Path, value: Option<&Value>) {
        if !self.options.write_metadata {
            return;
        }
        let Some(value) = value else {
            warn!(path = %path.display(), "no remote JSON for this node, metadata not written");
            return;
        };
        if let Err(error) = write_json(path, value).await {
            warn!(error = %error, "cannot write metadata");
        }
    }
}

async fn process_file(
    job: FileJob,
    access_key: Option<&str>,
    fetcher: &dyn FileFetcher,
    path_locks: &PathLocks,
) -> FileRecord {
    let lock = Arc::clone(
        &*path_locks
            .entry(job.target.clone())
            .or_insert_with(|| Arc::new(Mutex::new(()))),
    );
    let guard = lock.lock().await;
    let outcome = decide_and_fetch(&job, access_key, fetcher).await;
    drop(guard);
    release_path_lock(path_locks, &job.target, lock);

    FileRecord {
        course_id: job.course_id,
        module: job.module,
        path: job.target,
        outcome,
    }
}

#[instrument(skip_all, fields(target = %job.target.display()))]
async fn decide_and_fetch(
    job: &FileJob,
    access_key: Option<&str>,
    fetcher: &dyn FileFetcher,
) -> FileOutcome {
    if !job.force && tokio::fs::try_exists(&job.target).await.unwrap_or(false) {
        debug!("already present, skipping");
        return FileOutcome::SkippedExisting;
    }

    let Some(url) = access_key.and_then(|key| to_authenticated_url(&job.file_url, key)) else {
        warn!(module = %job.module, "no access key or unusable file URL, skipping");
        return FileOutcome::SkippedNoAccess;
    };

    match fetcher.fetch(&url, &job.target).await {
        Ok(bytes) => {
            debug!(url = %redact_url(&url), bytes, "downloaded");
            FileOutcome::Downloaded { bytes }
        }
        Err(error) => {
            warn!(module = %job.module, error = %error, "download failed");
            FileOutcome::Failed {
                status: error.status(),
                reason: error.to_string(),
            }
        }
    }
}

/// Drops the map entry for `target` once no other task holds or awaits it.
fn release_path_lock(path_locks: &PathLocks, target: &Path, lock: Arc<Mutex<()>>) {
    drop(lock);
    // The map keeps one reference; any other means a waiter is queued.
    path_locks.remove_if(target, |_, entry| Arc::strong_count(entry) == 1);
}

fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

async fn create_dir(path: &Path) -> Result<(), FilesystemError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| FilesystemError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_json(path: &Path, value: &Value) -> Result<(), FilesystemError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| {
        FilesystemError::EncodeMetadata {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| FilesystemError::WriteMetadata {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::download::DownloadError;
    use crate::moodle::{ApiError, CourseContents};

    struct EmptySource;

    #[async_trait]
    impl ContentSource for EmptySource {
        async fn course_contents(&self, _course_id: i64) -> Result<CourseContents, ApiError> {
            Ok(CourseContents::default())
        }
    }

    struct NoFetch;

    #[async_trait]
    impl FileFetcher for NoFetch {
        async fn fetch(&self, url: &str, _target: &Path) -> Result<u64, DownloadError> {
            Err(DownloadError::invalid_url(url))
        }
    }

    struct WriteFetch;

    #[async_trait]
    impl FileFetcher for WriteFetch {
        async fn fetch(&self, _url: &str, target: &Path) -> Result<u64, DownloadError> {
            tokio::fs::write(target, b"x")
                .await
                .map_err(|e| DownloadError::io(target, e))?;
            Ok(1)
        }
    }

    fn engine(concurrency: usize) -> Result<SyncEngine, EngineError> {
        SyncEngine::new(
            Arc::new(EmptySource),
            Arc::new(NoFetch),
            Layout::default(),
            Some("KEY".to_string()),
            SyncOptions {
                concurrency,
                write_metadata: false,
            },
        )
    }

    #[test]
    fn test_new_rejects_out_of_range_concurrency() {
        assert!(matches!(
            engine(0),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            engine(17),
            Err(EngineError::InvalidConcurrency { value: 17 })
        ));
        assert!(engine(1).is_ok());
        assert!(engine(16).is_ok());
    }

    #[test]
    fn test_default_options_are_sequential() {
        let options = SyncOptions::default();
        assert_eq!(options.concurrency, 1);
        assert!(!options.write_metadata);
    }

    #[tokio::test]
    async fn test_course_without_sections_is_no_content() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let engine = engine(1).unwrap();
        let course = Course {
            id: 3,
            full_name: "C: Empty".to_string(),
            ..Course::default()
        };

        let report = engine.sync(&[course], temp_dir.path(), false).await;

        assert_eq!(report.courses[0].outcome, CourseOutcome::NoContent);
        assert!(temp_dir.path().join("Empty").is_dir());
        assert!(report.files.is_empty());
    }

    #[tokio::test]
    async fn test_path_locks_are_released_after_jobs() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let target = temp_dir.path().join("a.pdf");
        let locks: PathLocks = Arc::new(DashMap::new());
        let job = || FileJob {
            course_id: 1,
            module: "Slides".to_string(),
            file_url: "https://m.example/webservice/pluginfile.php/1/a.pdf".to_string(),
            target: target.clone(),
            force: false,
        };

        let (first, second) = tokio::join!(
            process_file(job(), Some("KEY"), &WriteFetch, &locks),
            process_file(job(), Some("KEY"), &WriteFetch, &locks),
        );

        let mut outcomes = [first.outcome, second.outcome];
        outcomes.sort_by_key(|outcome| matches!(outcome, FileOutcome::SkippedExisting));
        assert_eq!(
            outcomes,
            [FileOutcome::Downloaded { bytes: 1 }, FileOutcome::SkippedExisting]
        );
        assert!(locks.is_empty(), "{} lock entries left", locks.len());
    }

    #[tokio::test]
    async fn test_waiting_job_keeps_path_lock_alive() {
        let target = PathBuf::from("/mirror/a.pdf");
        let locks: PathLocks = Arc::new(DashMap::new());
        let held = Arc::new(Mutex::new(()));
        locks.insert(target.clone(), Arc::clone(&held));
        let waiter = Arc::clone(&held);

        release_path_lock(&locks, &target, held);
        assert!(locks.contains_key(&target));

        release_path_lock(&locks, &target, waiter);
        assert!(locks.is_empty());
    }
}
