//! Filter, sort and option types for the query engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tunnelsync_types::{ModuleType, ProviderPreset};

/// Query predicate over a provider's server list.
///
/// Each field constrains one server attribute; an unset field means "no
/// constraint". All set fields must match at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFilters {
    /// Only servers supporting this module type.
    pub module_type: Option<ModuleType>,

    /// Only servers in this category.
    pub category_name: Option<String>,

    /// Only servers in this country.
    pub country_code: Option<String>,

    /// Only servers in this area.
    pub area: Option<String>,

    /// Only servers supporting this preset.
    pub preset_id: Option<String>,

    /// Only servers with one of these IDs.
    pub server_ids: Option<HashSet<String>>,
}

/// A sort key for server lists. Sorting is stable and multi-key, in
/// the order the fields are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSortField {
    /// By country code.
    Country,

    /// By area within the country.
    Area,

    /// By server ID.
    ServerId,
}

/// Aggregated filter choices derived from a provider's full server
/// list, used to populate filter UIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderFilterOptions {
    /// Country codes available per category name.
    pub countries_by_category: BTreeMap<String, BTreeSet<String>>,

    /// All country codes with at least one server.
    pub country_codes: BTreeSet<String>,

    /// Presets available for the requested module type.
    pub presets: Vec<ProviderPreset>,
}
