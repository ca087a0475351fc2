//! The fetch seam.

use crate::error::ProviderResult;
use async_trait::async_trait;
use tunnelsync_types::{Provider, ProviderCache, ProviderId, ProviderInfrastructure};

/// Turns a provider-supplied description into structured records.
///
/// Implementations may call an opaque provider script, a REST endpoint
/// or a bundled fixture; the manager tries the configured mappers in
/// priority order and stops at the first success.
#[async_trait]
pub trait InfrastructureMapper: Send + Sync {
    /// Fetches the global provider index.
    async fn index(&self) -> ProviderResult<Vec<Provider>>;

    /// Fetches one provider's infrastructure snapshot.
    ///
    /// `cache` carries the validators of the currently stored snapshot;
    /// implementations must use them for conditional requests and
    /// return [`ProviderError::NotModified`](crate::ProviderError::NotModified)
    /// when the source reports no change.
    async fn infrastructure(
        &self,
        provider_id: &ProviderId,
        cache: Option<&ProviderCache>,
    ) -> ProviderResult<ProviderInfrastructure>;
}
