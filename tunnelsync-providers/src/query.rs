//! Pure filter/sort functions over immutable server lists.

use crate::filters::{ProviderFilterOptions, ProviderFilters, ProviderSortField};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tunnelsync_types::{ModuleType, ProviderPreset, ProviderServer};

/// Applies filters and an optional multi-key sort to a server list.
///
/// Filtering is a conjunction of independent predicates; sorting is
/// applied only when at least one sort field is requested, since
/// sorting large lists is the expensive path.
pub fn filtered_servers(
    servers: &[ProviderServer],
    filters: &ProviderFilters,
    sorting: &[ProviderSortField],
) -> Vec<ProviderServer> {
    let mut selected: Vec<ProviderServer> = servers
        .iter()
        .filter(|server| matches(filters, server))
        .cloned()
        .collect();
    if !sorting.is_empty() {
        selected.sort_by(|a, b| compare(a, b, sorting));
    }
    selected
}

/// Derives the filter choices available for a module type from the full
/// server and preset lists.
pub fn available_options(
    servers: &[ProviderServer],
    presets: &[ProviderPreset],
    module_type: &ModuleType,
) -> ProviderFilterOptions {
    let mut countries_by_category: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut country_codes = BTreeSet::new();
    for server in servers {
        countries_by_category
            .entry(server.metadata.category_name.clone())
            .or_default()
            .insert(server.metadata.country_code.clone());
        country_codes.insert(server.metadata.country_code.clone());
    }
    let presets = presets
        .iter()
        .filter(|p| p.module_type == *module_type)
        .cloned()
        .collect();
    ProviderFilterOptions {
        countries_by_category,
        country_codes,
        presets,
    }
}

/// Whether a server satisfies every set filter field.
///
/// A server with no declared `supported_module_types` or
/// `supported_preset_ids` is unconstrained for that predicate: legacy
/// provider data omits those lists.
fn matches(filters: &ProviderFilters, server: &ProviderServer) -> bool {
    if let (Some(module_type), Some(supported)) =
        (&filters.module_type, &server.supported_module_types)
    {
        if !supported.contains(module_type) {
            return false;
        }
    }
    if let Some(category_name) = &filters.category_name {
        if server.metadata.category_name != *category_name {
            return false;
        }
    }
    if let Some(country_code) = &filters.country_code {
        if server.metadata.country_code != *country_code {
            return false;
        }
    }
    if let (Some(preset_id), Some(supported)) = (&filters.preset_id, &server.supported_preset_ids) {
        if !supported.contains(preset_id) {
            return false;
        }
    }
    if let Some(area) = &filters.area {
        if server.metadata.area.as_deref() != Some(area.as_str()) {
            return false;
        }
    }
    if let Some(server_ids) = &filters.server_ids {
        if !server_ids.contains(&server.server_id) {
            return false;
        }
    }
    true
}

fn compare(a: &ProviderServer, b: &ProviderServer, sorting: &[ProviderSortField]) -> Ordering {
    for field in sorting {
        let ordering = match field {
            ProviderSortField::Country => {
                a.metadata.country_code.cmp(&b.metadata.country_code)
            }
            ProviderSortField::Area => a.metadata.area.cmp(&b.metadata.area),
            ProviderSortField::ServerId => a.server_id.cmp(&b.server_id),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
