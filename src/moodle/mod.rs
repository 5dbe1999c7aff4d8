//! Mobile webservice API: login, function calls, payload types and file URL
//! rewriting.

mod client;
mod error;
mod file_url;
mod types;

use async_trait::async_trait;

pub use client::{BATCH_FUNCTION, MOBILE_SERVICE, WebserviceClient};
pub use error::{ApiError, AuthError, TransportError};
pub use file_url::{
    WEBSERVICE_PLUGINFILE, has_webservice_marker, redact_url, to_authenticated_url,
};
pub use types::{
    BatchRequest, BatchResponse, ContentItem, Course, CourseContents, FileContent, Module,
    Section, Session, SiteInfo, redact,
};

/// Source of course content trees.
///
/// Implemented by [`WebserviceClient`]; the sync engine only needs this one
/// call, which keeps it testable without a server.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Sections of `course_id` in remote order.
    async fn course_contents(&self, course_id: i64) -> Result<CourseContents, ApiError>;
}
