//! Query-capable view over one provider's cached infrastructure.

use crate::filters::{ProviderFilterOptions, ProviderFilters, ProviderSortField};
use crate::query;
use tunnelsync_types::{ModuleType, ProviderId, ProviderPreset, ProviderServer};

/// An immutable snapshot of one provider's servers and presets.
///
/// Obtained from
/// [`InfrastructureManager::provider_repository`](crate::InfrastructureManager::provider_repository);
/// all queries are pure functions over the snapshot, so holding one
/// never blocks the cache.
#[derive(Debug, Clone, Default)]
pub struct ProviderRepository {
    provider_id: ProviderId,
    servers: Vec<ProviderServer>,
    presets: Vec<ProviderPreset>,
}

impl ProviderRepository {
    /// Creates a view over the given snapshot.
    pub fn new(
        provider_id: ProviderId,
        servers: Vec<ProviderServer>,
        presets: Vec<ProviderPreset>,
    ) -> Self {
        Self {
            provider_id,
            servers,
            presets,
        }
    }

    /// The provider this view belongs to.
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// All servers in the snapshot.
    pub fn servers(&self) -> &[ProviderServer] {
        &self.servers
    }

    /// All presets in the snapshot.
    pub fn presets(&self) -> &[ProviderPreset] {
        &self.presets
    }

    /// Filter choices available for the given module type.
    pub fn available_options(&self, module_type: &ModuleType) -> ProviderFilterOptions {
        query::available_options(&self.servers, &self.presets, module_type)
    }

    /// Servers matching the filters, optionally sorted.
    pub fn filtered_servers(
        &self,
        filters: &ProviderFilters,
        sorting: &[ProviderSortField],
    ) -> Vec<ProviderServer> {
        query::filtered_servers(&self.servers, filters, sorting)
    }

    /// Presets of the given module type usable by a server, honoring
    /// the server's supported-preset list when declared.
    pub fn presets_for(
        &self,
        server: &ProviderServer,
        module_type: &ModuleType,
    ) -> Vec<ProviderPreset> {
        self.presets
            .iter()
            .filter(|preset| preset.module_type == *module_type)
            .filter(|preset| match &server.supported_preset_ids {
                Some(supported) => supported.contains(&preset.preset_id),
                None => true,
            })
            .cloned()
            .collect()
    }
}
