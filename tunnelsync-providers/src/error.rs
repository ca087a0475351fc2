//! Error types for the provider cache.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur in provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote infrastructure is unchanged since the cached
    /// snapshot. A cache-hit signal, not a failure: the manager maps
    /// it to success without storing anything.
    #[error("infrastructure not modified")]
    NotModified,

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network or mapper failure outside the HTTP client.
    #[error("network error: {0}")]
    Network(String),

    /// Payload decoding failure.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backing repository failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl ProviderError {
    /// Whether this error is the distinguished cache-hit signal.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::NotModified)
    }
}
