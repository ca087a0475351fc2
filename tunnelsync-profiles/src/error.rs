//! Error types for the profile reconciler.

use thiserror::Error;

/// Result type for reconciler operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Errors that can occur in reconciler operations.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The backing repository failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// A processor rejected or failed to rebuild a profile.
    #[error("processor error: {0}")]
    Processor(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested profile does not exist.
    #[error("profile not found: {0}")]
    NotFound(tunnelsync_types::ProfileId),
}
