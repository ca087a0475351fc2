//! Provider catalog types.
//!
//! These model a VPN provider's published infrastructure: the provider
//! index, per-provider servers and presets, and the conditional fetch
//! token used to keep the cached snapshot fresh.

use crate::{ModuleType, ProviderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// A VPN provider as listed in the global index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// The provider ID.
    pub id: ProviderId,

    /// Human-readable provider name.
    pub description: String,

    /// Module types the provider supports.
    #[serde(default)]
    pub module_types: BTreeSet<ModuleType>,
}

impl Provider {
    /// Creates a provider entry.
    pub fn new(
        id: impl Into<ProviderId>,
        description: impl Into<String>,
        module_types: impl IntoIterator<Item = ModuleType>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            module_types: module_types.into_iter().collect(),
        }
    }

    /// Whether the provider supports the given module type.
    pub fn supports(&self, module_type: &ModuleType) -> bool {
        self.module_types.contains(module_type)
    }
}

/// Location and categorization metadata of a provider server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// The provider this server belongs to.
    pub provider_id: ProviderId,

    /// Category name (e.g. "default", "streaming").
    pub category_name: String,

    /// ISO country code of the server location.
    pub country_code: String,

    /// Additional country codes the server advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_country_codes: Option<Vec<String>>,

    /// Optional area within the country (e.g. a city).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

/// A single server in a provider's infrastructure.
///
/// `supported_module_types` and `supported_preset_ids` are `None` for
/// legacy/unspecified provider data, which means "unconstrained": the
/// server matches every module-type and preset filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderServer {
    /// Location and categorization metadata.
    pub metadata: ServerMetadata,

    /// Server identifier, unique within the provider.
    pub server_id: String,

    /// Hostname to connect to, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Resolved IP addresses, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<BTreeSet<IpAddr>>,

    /// Module types this server supports, `None` = all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_module_types: Option<Vec<ModuleType>>,

    /// Preset IDs this server supports, `None` = all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_preset_ids: Option<Vec<String>>,
}

impl ProviderServer {
    /// Composite ID of the server, `providerId.serverId`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.metadata.provider_id, self.server_id)
    }
}

/// A connection preset published by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreset {
    /// The provider this preset belongs to.
    pub provider_id: ProviderId,

    /// Preset identifier, unique within the provider.
    pub preset_id: String,

    /// Human-readable preset name.
    pub description: String,

    /// The module type this preset configures.
    pub module_type: ModuleType,

    /// Opaque configuration template, decoded lazily by the consumer.
    #[serde(default)]
    pub template: serde_json::Value,
}

impl ProviderPreset {
    /// Composite ID of the preset, `providerId.presetId`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.provider_id, self.preset_id)
    }

    /// Decodes the template payload into a concrete configuration type.
    pub fn template_as<T>(&self) -> crate::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(serde_json::from_value(self.template.clone())?)
    }
}

/// Freshness token pair for a cached infrastructure snapshot.
///
/// `last_update` is the server-asserted timestamp; `tag` is an opaque
/// validator such as an HTTP ETag. Both feed the conditional request
/// headers of the next fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCache {
    /// Server-asserted timestamp of the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Opaque validator (e.g. an ETag).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// A full infrastructure snapshot for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfrastructure {
    /// Available presets.
    #[serde(default)]
    pub presets: Vec<ProviderPreset>,

    /// Available servers.
    #[serde(default)]
    pub servers: Vec<ProviderServer>,

    /// Freshness token of this snapshot, if the source provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<ProviderCache>,
}
