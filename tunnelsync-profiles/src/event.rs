//! Reconciler change events.

use std::collections::HashMap;
use tunnelsync_types::{Profile, ProfileHeader, ProfileId};

/// Events published by the [`ProfileManager`](crate::ProfileManager).
///
/// Events are delivered to each subscriber in production order, with no
/// coalescing. The UI is expected to gate initial display on `Ready`
/// and treat everything after it as incremental.
#[derive(Debug, Clone)]
pub enum ProfileEvent {
    /// All configured observers completed their initial fetch.
    /// Emitted exactly once per manager instance.
    Ready,

    /// A profile was written to the local repository.
    Saved {
        /// The profile as saved.
        profile: Profile,
        /// The previously held version, if any.
        previous: Option<Profile>,
    },

    /// Profiles were removed from the local repository.
    Removed(Vec<ProfileId>),

    /// The derived header projection changed.
    HeadersRefreshed(HashMap<ProfileId, ProfileHeader>),

    /// A remote snapshot arrived and its import is starting.
    RemoteImportStarted,

    /// The remote import task ended (completed or cancelled).
    RemoteImportFinished,
}
