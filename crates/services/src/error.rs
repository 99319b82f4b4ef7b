//! Shared error types for the services crate.

use thiserror::Error;

use storage::CacheError;

/// Errors emitted while constructing a `ProgressService`.
///
/// Progress mutations never return these: once the service is running,
/// storage failures are logged and the in-memory record stays authoritative.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}
