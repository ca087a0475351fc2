//! In-memory profile repository.
//!
//! Reference implementation of [`ProfileRepository`], also used by
//! tests to stand in for both the local and the remote store.

use crate::error::ProfileResult;
use crate::repository::ProfileRepository;
use async_trait::async_trait;
use tokio::sync::watch;
use tunnelsync_types::{Profile, ProfileId};

/// A [`ProfileRepository`] backed by a watch channel.
#[derive(Debug)]
pub struct InMemoryProfileRepository {
    profiles: watch::Sender<Vec<Profile>>,
}

impl InMemoryProfileRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::with_profiles(Vec::new())
    }

    /// Creates a repository seeded with the given profiles.
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        let (sender, _) = watch::channel(profiles);
        Self { profiles: sender }
    }

    /// Replaces the whole snapshot, simulating an external writer.
    pub fn set_profiles(&self, profiles: Vec<Profile>) {
        let _ = self.profiles.send(profiles);
    }

    /// Current number of stored profiles.
    pub fn len(&self) -> usize {
        self.profiles.borrow().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.profiles.borrow().is_empty()
    }

    /// Returns the stored profile with the given ID, if any.
    pub fn profile(&self, id: &ProfileId) -> Option<Profile> {
        self.profiles.borrow().iter().find(|p| p.id == *id).cloned()
    }
}

impl Default for InMemoryProfileRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn fetch_all(&self) -> ProfileResult<Vec<Profile>> {
        Ok(self.profiles.borrow().clone())
    }

    async fn save(&self, profile: Profile) -> ProfileResult<()> {
        self.profiles.send_modify(|profiles| {
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
        });
        Ok(())
    }

    async fn remove(&self, ids: &[ProfileId]) -> ProfileResult<()> {
        self.profiles.send_modify(|profiles| {
            profiles.retain(|p| !ids.contains(&p.id));
        });
        Ok(())
    }

    async fn remove_all(&self) -> ProfileResult<()> {
        self.profiles.send_modify(Vec::clear);
        Ok(())
    }

    fn changes(&self) -> watch::Receiver<Vec<Profile>> {
        self.profiles.subscribe()
    }
}
