//! The storage seam and its in-memory implementation.

use crate::error::ProviderResult;
use crate::repository::ProviderRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::info;
use tunnelsync_types::{
    ModuleType, Provider, ProviderCache, ProviderId, ProviderInfrastructure, ProviderPreset,
    ProviderServer,
};

/// Reader/writer interface over the provider catalog store.
///
/// Persistence implementations live outside this crate; the in-memory
/// implementation below defines the reference semantics, most notably
/// the anti-regression freshness rule in `store_infrastructure`.
#[async_trait]
pub trait ApiRepository: Send + Sync {
    /// Replaces the stored provider index.
    async fn store_index(&self, providers: Vec<Provider>) -> ProviderResult<()>;

    /// Stores one provider's infrastructure snapshot.
    ///
    /// A snapshot whose `last_update` is not strictly newer than the
    /// stored one is discarded silently.
    async fn store_infrastructure(
        &self,
        provider_id: ProviderId,
        infrastructure: ProviderInfrastructure,
    ) -> ProviderResult<()>;

    /// Drops cached infrastructure, either for the given providers or
    /// for all of them.
    async fn reset_cache(&self, provider_ids: Option<&[ProviderId]>);

    /// Change stream of the provider index.
    fn index_changes(&self) -> watch::Receiver<Vec<Provider>>;

    /// Change stream of the per-provider freshness tokens.
    fn cache_changes(&self) -> watch::Receiver<HashMap<ProviderId, ProviderCache>>;

    /// Presets of the given module type usable by a server.
    async fn presets_for(
        &self,
        server: &ProviderServer,
        module_type: &ModuleType,
    ) -> ProviderResult<Vec<ProviderPreset>>;

    /// Query view over one provider's stored snapshot. Empty when
    /// nothing is stored for the provider.
    fn provider_repository(&self, provider_id: &ProviderId) -> ProviderRepository;
}

/// An [`ApiRepository`] backed by watch channels.
#[derive(Debug)]
pub struct InMemoryApiRepository {
    providers: watch::Sender<Vec<Provider>>,
    infrastructures: watch::Sender<HashMap<ProviderId, ProviderInfrastructure>>,
    caches: watch::Sender<HashMap<ProviderId, ProviderCache>>,
}

impl InMemoryApiRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        let (providers, _) = watch::channel(Vec::new());
        let (infrastructures, _) = watch::channel(HashMap::new());
        let (caches, _) = watch::channel(HashMap::new());
        Self {
            providers,
            infrastructures,
            caches,
        }
    }

    /// The stored infrastructure for a provider, if any.
    pub fn infrastructure(&self, provider_id: &ProviderId) -> Option<ProviderInfrastructure> {
        self.infrastructures.borrow().get(provider_id).cloned()
    }

    fn publish_caches(&self) {
        let caches: HashMap<ProviderId, ProviderCache> = self
            .infrastructures
            .borrow()
            .iter()
            .filter_map(|(id, infra)| infra.cache.clone().map(|c| (id.clone(), c)))
            .collect();
        let _ = self.caches.send(caches);
    }
}

impl Default for InMemoryApiRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiRepository for InMemoryApiRepository {
    async fn store_index(&self, providers: Vec<Provider>) -> ProviderResult<()> {
        let _ = self.providers.send(providers);
        Ok(())
    }

    async fn store_infrastructure(
        &self,
        provider_id: ProviderId,
        infrastructure: ProviderInfrastructure,
    ) -> ProviderResult<()> {
        let stored_update = self
            .infrastructures
            .borrow()
            .get(&provider_id)
            .and_then(|infra| infra.cache.as_ref())
            .and_then(|cache| cache.last_update);
        if let (Some(new), Some(current)) = (
            infrastructure.cache.as_ref().and_then(|c| c.last_update),
            stored_update,
        ) {
            if new <= current {
                info!(
                    %provider_id,
                    %new,
                    %current,
                    "discarding infrastructure not newer than stored one"
                );
                return Ok(());
            }
        }
        self.infrastructures.send_modify(|infras| {
            infras.insert(provider_id, infrastructure);
        });
        self.publish_caches();
        Ok(())
    }

    async fn reset_cache(&self, provider_ids: Option<&[ProviderId]>) {
        self.infrastructures.send_modify(|infras| match provider_ids {
            Some(ids) => infras.retain(|id, _| !ids.contains(id)),
            None => infras.clear(),
        });
        self.publish_caches();
    }

    fn index_changes(&self) -> watch::Receiver<Vec<Provider>> {
        self.providers.subscribe()
    }

    fn cache_changes(&self) -> watch::Receiver<HashMap<ProviderId, ProviderCache>> {
        self.caches.subscribe()
    }

    async fn presets_for(
        &self,
        server: &ProviderServer,
        module_type: &ModuleType,
    ) -> ProviderResult<Vec<ProviderPreset>> {
        let view = self.provider_repository(&server.metadata.provider_id);
        Ok(view.presets_for(server, module_type))
    }

    fn provider_repository(&self, provider_id: &ProviderId) -> ProviderRepository {
        let infras = self.infrastructures.borrow();
        let infra = infras.get(provider_id);
        ProviderRepository::new(
            provider_id.clone(),
            infra.map(|i| i.servers.clone()).unwrap_or_default(),
            infra.map(|i| i.presets.clone()).unwrap_or_default(),
        )
    }
}
