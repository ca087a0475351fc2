//! Externally supplied business rules.

use crate::error::ProfileResult;
use std::collections::BTreeSet;
use tunnelsync_types::{Feature, Profile};

/// Hooks the app layer injects into the reconciler.
///
/// The reconciler applies these without knowing the business reason
/// (platform eligibility, paywall tiers, ...). All methods have
/// permissive defaults.
pub trait ProfileProcessor: Send + Sync {
    /// Whether the profile belongs in the authoritative set.
    ///
    /// Excluded profiles are dropped from the in-memory map and deleted
    /// from the repository as a self-healing cleanup.
    fn is_included(&self, _profile: &Profile) -> bool {
        true
    }

    /// Features the profile requires, for paywall gating in headers.
    fn required_features(&self, _profile: &Profile) -> BTreeSet<Feature> {
        BTreeSet::new()
    }

    /// Rewrites a profile before a local save (e.g. stripping fields
    /// the current app tier may not persist).
    fn will_rebuild(&self, profile: Profile) -> ProfileResult<Profile> {
        Ok(profile)
    }
}
