//! Repository seam over the profile backing store.
//!
//! Persistence (disk, CloudKit-style shared stores, ...) lives behind
//! this trait; the reconciler never assumes exclusive access and must
//! tolerate external writers to the same backing store.

use crate::error::ProfileResult;
use async_trait::async_trait;
use tokio::sync::watch;
use tunnelsync_types::{Profile, ProfileId};

/// Narrow reader/writer interface over a profile store.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetches the current full snapshot.
    async fn fetch_all(&self) -> ProfileResult<Vec<Profile>>;

    /// Writes (inserts or replaces) a profile.
    async fn save(&self, profile: Profile) -> ProfileResult<()>;

    /// Removes the profiles with the given IDs. Unknown IDs are ignored.
    async fn remove(&self, ids: &[ProfileId]) -> ProfileResult<()>;

    /// Removes every profile in the store.
    async fn remove_all(&self) -> ProfileResult<()>;

    /// Change-notification stream of full snapshots.
    ///
    /// The receiver's `borrow` exposes the current state; `changed`
    /// resolves on each subsequent snapshot, so observers naturally
    /// skip the replay of the initial value.
    fn changes(&self) -> watch::Receiver<Vec<Profile>>;
}
