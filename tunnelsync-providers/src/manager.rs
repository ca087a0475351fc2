//! Fetch orchestration and deduplication.

use crate::error::{ProviderError, ProviderResult};
use crate::mapper::InfrastructureMapper;
use crate::repository::ProviderRepository;
use crate::store::ApiRepository;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tunnelsync_events::{EventBus, EventSubscription};
use tunnelsync_types::{Provider, ProviderCache, ProviderId};

/// Events published by the [`InfrastructureManager`].
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// The global provider index was refreshed.
    IndexUpdated(Vec<Provider>),

    /// The per-provider freshness tokens changed: a fetch stored a new
    /// snapshot, or a cache reset dropped entries.
    CacheUpdated(HashMap<ProviderId, ProviderCache>),
}

/// An in-flight operation, used to deduplicate concurrent fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Pending {
    Index,
    Provider(ProviderId),
}

/// Releases the pending slot when the fetch ends, on every path.
struct PendingGuard<'a> {
    pending: &'a StdMutex<HashSet<Pending>>,
    key: Pending,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.key);
    }
}

/// Fetches, caches and serves per-provider infrastructure.
///
/// All cache mutation happens through the repository; the manager
/// mirrors the repository streams into immutable snapshots for readers.
pub struct InfrastructureManager {
    mappers: Vec<Arc<dyn InfrastructureMapper>>,
    repository: Arc<dyn ApiRepository>,
    providers: RwLock<Vec<Provider>>,
    cache: RwLock<HashMap<ProviderId, ProviderCache>>,
    pending: StdMutex<HashSet<Pending>>,
    events: EventBus<ProviderEvent>,
    subscriptions: StdMutex<Vec<JoinHandle<()>>>,
}

impl InfrastructureManager {
    /// Creates a manager over the given mappers (tried in priority
    /// order) and repository.
    pub fn new(
        mappers: Vec<Arc<dyn InfrastructureMapper>>,
        repository: Arc<dyn ApiRepository>,
    ) -> Self {
        Self {
            mappers,
            repository,
            providers: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::new()),
            pending: StdMutex::new(HashSet::new()),
            events: EventBus::new(),
            subscriptions: StdMutex::new(Vec::new()),
        }
    }

    /// Starts mirroring the repository streams. Call once after
    /// construction.
    pub async fn observe(self: &Arc<Self>) {
        let mut index_changes = self.repository.index_changes();
        let mut cache_changes = self.repository.cache_changes();

        *self.providers.write().await = index_changes.borrow_and_update().clone();
        *self.cache.write().await = cache_changes.borrow_and_update().clone();

        let weak = Arc::downgrade(self);
        let index_task = tokio::spawn(async move {
            while index_changes.changed().await.is_ok() {
                let providers = index_changes.borrow_and_update().clone();
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                *manager.providers.write().await = providers.clone();
                manager.events.send(ProviderEvent::IndexUpdated(providers));
            }
        });

        let weak = Arc::downgrade(self);
        let cache_task = tokio::spawn(async move {
            while cache_changes.changed().await.is_ok() {
                let caches = cache_changes.borrow_and_update().clone();
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                *manager.cache.write().await = caches.clone();
                manager.events.send(ProviderEvent::CacheUpdated(caches));
            }
        });

        let mut subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.push(index_task);
        subscriptions.push(cache_task);
    }

    /// Opens an independent event subscription starting from now.
    pub fn subscribe(&self) -> EventSubscription<ProviderEvent> {
        self.events.subscribe()
    }

    // ── Fetching ─────────────────────────────────────────────────

    /// Fetches the global provider index.
    ///
    /// A call while another index fetch is pending is a silent no-op.
    /// Mappers are tried in order; the last error surfaces only after
    /// all of them failed.
    pub async fn fetch_index(&self) -> ProviderResult<()> {
        let Some(_guard) = self.begin(Pending::Index) else {
            debug!("discarding fetch_index, another one is pending");
            return Ok(());
        };

        let mut last_error = None;
        for mapper in &self.mappers {
            match mapper.index().await {
                Ok(index) => {
                    self.repository.store_index(index).await?;
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "unable to fetch index");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetches one provider's infrastructure, passing the cached
    /// freshness token for conditional requests.
    ///
    /// A call while a fetch for the same provider is pending is a
    /// silent no-op; callers poll or subscribe for the eventual result.
    /// A `NotModified` outcome is success: nothing is stored and no
    /// error surfaces.
    pub async fn fetch_infrastructure(&self, provider_id: &ProviderId) -> ProviderResult<()> {
        let Some(_guard) = self.begin(Pending::Provider(provider_id.clone())) else {
            debug!(%provider_id, "discarding fetch_infrastructure, another one is pending");
            return Ok(());
        };

        let mut last_error = None;
        for mapper in &self.mappers {
            let cache = self.cache.read().await.get(provider_id).cloned();
            match mapper.infrastructure(provider_id, cache.as_ref()).await {
                Ok(infrastructure) => {
                    self.repository
                        .store_infrastructure(provider_id.clone(), infrastructure)
                        .await?;
                    return Ok(());
                }
                Err(ProviderError::NotModified) => {
                    info!(%provider_id, "infrastructure is up to date");
                    return Ok(());
                }
                Err(e) => {
                    warn!(%provider_id, error = %e, "unable to fetch infrastructure");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Query view over a provider's infrastructure, fetching it first
    /// when nothing is cached yet.
    pub async fn provider_repository(
        &self,
        provider_id: &ProviderId,
    ) -> ProviderResult<ProviderRepository> {
        if self.cache_for(provider_id).await.is_none() {
            self.fetch_infrastructure(provider_id).await?;
        }
        Ok(self.repository.provider_repository(provider_id))
    }

    /// Drops every provider's cached infrastructure.
    pub async fn reset_cache(&self) {
        self.repository.reset_cache(None).await;
    }

    /// Drops the cached infrastructure of the given providers.
    pub async fn reset_cache_for(&self, provider_ids: &[ProviderId]) {
        self.repository.reset_cache(Some(provider_ids)).await;
    }

    // ── Projections ──────────────────────────────────────────────

    /// The current provider index.
    pub async fn providers(&self) -> Vec<Provider> {
        self.providers.read().await.clone()
    }

    /// The indexed provider with the given ID, if any.
    pub async fn provider(&self, provider_id: &ProviderId) -> Option<Provider> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.id == *provider_id)
            .cloned()
    }

    /// The freshness token of a provider's cached snapshot, if any.
    pub async fn cache_for(&self, provider_id: &ProviderId) -> Option<ProviderCache> {
        self.cache.read().await.get(provider_id).cloned()
    }

    /// Whether any fetch is currently in flight.
    pub fn is_loading(&self) -> bool {
        !self.pending.lock().unwrap().is_empty()
    }

    fn begin(&self, key: Pending) -> Option<PendingGuard<'_>> {
        if self.pending.lock().unwrap().insert(key.clone()) {
            Some(PendingGuard {
                pending: &self.pending,
                key,
            })
        } else {
            None
        }
    }
}

impl Drop for InfrastructureManager {
    fn drop(&mut self) {
        for handle in self.subscriptions.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}
