//! Profile values and their UI-facing projections.
//!
//! A `Profile` is an immutable value: engines never mutate one in
//! place, they replace it wholesale. `ProfileHeader` is a derived
//! projection recomputed whenever the authoritative profile map
//! changes; it is never edited independently.

use crate::{Fingerprint, ModuleId, ModuleType, ProfileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single connection module inside a profile.
///
/// The content is an opaque JSON payload; the core never interprets it
/// beyond the module type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Unique identifier of this module.
    pub id: ModuleId,

    /// The module type (e.g. "openvpn", "wireguard", "dns").
    pub module_type: ModuleType,

    /// Module configuration, opaque to the sync core.
    #[serde(default)]
    pub content: serde_json::Value,
}

impl Module {
    /// Creates a new module of the given type with empty content.
    pub fn new(module_type: impl Into<ModuleType>) -> Self {
        Self {
            id: ModuleId::new(),
            module_type: module_type.into(),
            content: serde_json::Value::Null,
        }
    }

    /// Sets the module content.
    #[must_use]
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }
}

/// Versioning and sharing attributes attached to a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    /// Opaque version token, regenerated on every local save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,

    /// When the profile was last saved locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Whether the profile is shared for use on TV devices.
    #[serde(default)]
    pub available_for_tv: bool,
}

/// An immutable VPN profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier.
    pub id: ProfileId,

    /// Display name.
    pub name: String,

    /// Ordered list of connection modules.
    #[serde(default)]
    pub modules: Vec<Module>,

    /// IDs of the modules that are currently active.
    #[serde(default)]
    pub active_modules: BTreeSet<ModuleId>,

    /// Versioning and sharing attributes.
    #[serde(default)]
    pub attributes: ProfileAttributes,
}

impl Profile {
    /// Creates an empty profile with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(),
            name: name.into(),
            modules: Vec::new(),
            active_modules: BTreeSet::new(),
            attributes: ProfileAttributes::default(),
        }
    }

    /// Appends a module and marks it active.
    #[must_use]
    pub fn with_active_module(mut self, module: Module) -> Self {
        self.active_modules.insert(module.id);
        self.modules.push(module);
        self
    }

    /// Replaces the profile attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: ProfileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Returns a copy under a new identity, dropping the version token.
    /// Used when duplicating a profile.
    #[must_use]
    pub fn duplicated(&self) -> Self {
        let mut copy = self.clone();
        copy.id = ProfileId::new();
        copy.attributes.fingerprint = None;
        copy
    }

    /// The modules that are currently active, in declaration order.
    pub fn active_modules(&self) -> impl Iterator<Item = &Module> {
        self.modules
            .iter()
            .filter(|m| self.active_modules.contains(&m.id))
    }
}

/// How a profile is shared across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingFlag {
    /// Present in the remote (shared) repository.
    Shared,

    /// Shared and marked available for TV devices.
    Tv,
}

/// A paid app feature a profile may require.
///
/// Used by the UI layer for paywall gating; the reconciler only carries
/// the set, the business meaning comes from the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AppleTv,
    OnDemand,
    Providers,
    Sharing,
}

/// Read-only, UI-facing projection of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileHeader {
    /// The profile ID.
    pub id: ProfileId,

    /// Display name.
    pub name: String,

    /// Sharing state of the profile.
    pub sharing_flags: Vec<SharingFlag>,

    /// Features the profile requires, for paywall gating.
    pub required_features: BTreeSet<Feature>,
}

impl ProfileHeader {
    /// Derives a header from a profile.
    pub fn new(
        profile: &Profile,
        sharing_flags: Vec<SharingFlag>,
        required_features: BTreeSet<Feature>,
    ) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            sharing_flags,
            required_features,
        }
    }
}
