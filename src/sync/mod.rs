//! Course tree synchronization.
//!
//! [`SyncEngine`] walks course → section → module → file, creates the local
//! directories, and decides per file whether to skip or download it. Every
//! decision ends up in a [`SyncReport`].

mod engine;
mod error;
mod report;

pub use engine::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, SyncEngine, SyncOptions};
pub use error::{EngineError, FilesystemError};
pub use report::{
    CourseOutcome, CourseRecord, FileOutcome, FileRecord, SyncReport, SyncSummary,
};
