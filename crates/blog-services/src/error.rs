//! Mapping of data-access failures onto service errors

use blog_core::BlogError;
use blog_db::RepositoryError;

/// Convert a repository failure into the service-level error.
///
/// Every repository failure surfaces as `BlogError::Database`; not-found
/// situations are decided by the services themselves.
pub fn repository_error(err: RepositoryError) -> BlogError {
    tracing::warn!(error = %err, "repository call failed");
    BlogError::Database(err.to_string())
}
