//! The profile reconciler.
//!
//! `ProfileManager` is the single logical owner of the authoritative
//! profile map. All mutation funnels through its methods behind one
//! lock; readers only ever receive cloned snapshots. It observes the
//! local repository (always) and an optional remote repository, and
//! merges remote snapshots through a cancellable background import.

use crate::error::{ProfileError, ProfileResult};
use crate::event::ProfileEvent;
use crate::processor::ProfileProcessor;
use crate::repository::ProfileRepository;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tunnelsync_events::{EventBus, EventSubscription};
use tunnelsync_types::{Feature, Fingerprint, Profile, ProfileHeader, ProfileId, SharingFlag};

/// The sources the manager waits on before declaring itself ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Observer {
    Local,
    Remote,
}

/// Configuration for a [`ProfileManager`].
#[derive(Debug, Clone, Default)]
pub struct ProfileManagerConfig {
    /// Whether local deletions are derived from entries missing in a
    /// remote snapshot (`true`) or remote data is only ever additive
    /// (`false`).
    pub mirrors_remote: bool,

    /// Whether readiness additionally waits for the first remote
    /// snapshot.
    pub ready_after_remote: bool,
}

#[derive(Debug, Default)]
struct ManagerState {
    all_profiles: HashMap<ProfileId, Profile>,
    remote_ids: HashSet<ProfileId>,
    waiting: HashSet<Observer>,
    ready_sent: bool,
}

struct ImportTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the authoritative profile set and keeps it eventually
/// consistent with the configured repositories.
pub struct ProfileManager {
    local: Arc<dyn ProfileRepository>,
    backup: Option<Arc<dyn ProfileRepository>>,
    remote: RwLock<Option<Arc<dyn ProfileRepository>>>,
    processor: Option<Arc<dyn ProfileProcessor>>,
    mirrors_remote: bool,
    state: RwLock<ManagerState>,
    events: EventBus<ProfileEvent>,
    import: Mutex<Option<ImportTask>>,
    subscriptions: StdMutex<Vec<JoinHandle<()>>>,
}

impl ProfileManager {
    /// Creates a manager over the given local repository.
    pub fn new(local: Arc<dyn ProfileRepository>, config: ProfileManagerConfig) -> Self {
        let mut waiting = HashSet::from([Observer::Local]);
        if config.ready_after_remote {
            waiting.insert(Observer::Remote);
        }
        Self {
            local,
            backup: None,
            remote: RwLock::new(None),
            processor: None,
            mirrors_remote: config.mirrors_remote,
            state: RwLock::new(ManagerState {
                waiting,
                ..Default::default()
            }),
            events: EventBus::new(),
            import: Mutex::new(None),
            subscriptions: StdMutex::new(Vec::new()),
        }
    }

    /// Adds a best-effort backup repository mirroring local saves.
    #[must_use]
    pub fn with_backup(mut self, backup: Arc<dyn ProfileRepository>) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Injects the app-layer processor.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn ProfileProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Opens an independent event subscription starting from now.
    pub fn subscribe(&self) -> EventSubscription<ProfileEvent> {
        self.events.subscribe()
    }

    // ── Observation ──────────────────────────────────────────────

    /// Performs the initial local fetch, then follows the local
    /// repository's change stream.
    pub async fn observe_local(self: &Arc<Self>) -> ProfileResult<()> {
        let initial = self.local.fetch_all().await?;
        self.reload_local(initial).await;

        let mut changes = self.local.changes();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let profiles = changes.borrow_and_update().clone();
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                manager.reload_local(profiles).await;
            }
        });
        self.subscriptions.lock().unwrap().push(handle);
        Ok(())
    }

    /// Performs the initial remote fetch, then follows the remote
    /// repository's change stream. Each snapshot spawns (or replaces)
    /// the remote import task.
    pub async fn observe_remote(
        self: &Arc<Self>,
        repository: Arc<dyn ProfileRepository>,
    ) -> ProfileResult<()> {
        let mut changes = repository.changes();
        *self.remote.write().await = Some(repository.clone());

        let initial = repository.fetch_all().await?;
        self.reload_remote(initial).await;

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let profiles = changes.borrow_and_update().clone();
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                manager.reload_remote(profiles).await;
            }
        });
        self.subscriptions.lock().unwrap().push(handle);
        Ok(())
    }

    // ── Actions ──────────────────────────────────────────────────

    /// Saves a profile.
    ///
    /// A local save (`is_local`) stamps a fresh `last_update` and
    /// fingerprint before writing; this is the only path that changes a
    /// fingerprint. A profile structurally equal to the stored one is a
    /// no-op: no write, no event. `remotely_shared` toggles sharing
    /// explicitly; when unset, a local save keeps the current sharing
    /// state.
    ///
    /// Errors from the local repository propagate; backup and remote
    /// writes are best-effort.
    pub async fn save(
        &self,
        profile: Profile,
        is_local: bool,
        remotely_shared: Option<bool>,
    ) -> ProfileResult<()> {
        let profile = if is_local {
            let mut rebuilt = match &self.processor {
                Some(processor) => processor.will_rebuild(profile)?,
                None => profile,
            };
            rebuilt.attributes.last_update = Some(Utc::now());
            rebuilt.attributes.fingerprint = Some(Fingerprint::new());
            rebuilt
        } else {
            profile
        };

        info!(profile_id = %profile.id, "saving profile");
        let existing = self
            .state
            .read()
            .await
            .all_profiles
            .get(&profile.id)
            .cloned();

        if existing.as_ref() != Some(&profile) {
            if let Err(e) = self.local.save(profile.clone()).await {
                warn!(profile_id = %profile.id, error = %e, "unable to save profile");
                return Err(e);
            }
            if let Some(backup) = &self.backup {
                let backup = backup.clone();
                let copy = profile.clone();
                tokio::spawn(async move {
                    if let Err(e) = backup.save(copy).await {
                        warn!(error = %e, "unable to save profile to backup repository");
                    }
                });
            }
            self.apply_saved(&profile).await;
            self.events.send(ProfileEvent::Saved {
                profile: profile.clone(),
                previous: existing,
            });
        } else {
            debug!(profile_id = %profile.id, "profile not modified, not saving");
        }

        let remote = self.remote.read().await.clone();
        if let Some(remote) = remote {
            let currently_shared = self.is_remotely_shared(&profile.id).await;
            let enable = remotely_shared == Some(true)
                || (remotely_shared.is_none() && is_local && currently_shared);
            let disable = remotely_shared == Some(false);
            if enable {
                info!(profile_id = %profile.id, "enabling remote sharing");
                if let Err(e) = remote.save(profile.clone()).await {
                    warn!(profile_id = %profile.id, error = %e, "unable to save remote profile");
                }
            } else if disable {
                info!(profile_id = %profile.id, "disabling remote sharing");
                if let Err(e) = remote.remove(&[profile.id]).await {
                    warn!(profile_id = %profile.id, error = %e, "unable to remove remote profile");
                }
            }
        }
        Ok(())
    }

    /// Removes profiles from the local repository, best-effort from the
    /// remote one, then emits `Removed`.
    pub async fn remove(&self, ids: &[ProfileId]) -> ProfileResult<()> {
        info!(?ids, "removing profiles");
        if let Err(e) = self.local.remove(ids).await {
            warn!(?ids, error = %e, "unable to remove profiles");
            return Err(e);
        }
        if let Some(remote) = self.remote.read().await.clone() {
            if let Err(e) = remote.remove(ids).await {
                warn!(?ids, error = %e, "unable to remove remote profiles");
            }
        }
        let headers = {
            let mut state = self.state.write().await;
            for id in ids {
                state.all_profiles.remove(id);
            }
            self.computed_headers(&state)
        };
        self.events.send(ProfileEvent::Removed(ids.to_vec()));
        self.events.send(ProfileEvent::HeadersRefreshed(headers));
        Ok(())
    }

    /// Copies a profile under a new identity and a first unique name.
    pub async fn duplicate(&self, id: &ProfileId) -> ProfileResult<()> {
        let Some(profile) = self.profile(id).await else {
            return Err(ProfileError::NotFound(*id));
        };
        let mut copy = profile.duplicated();
        copy.name = self.first_unique_name(&profile.name).await;
        info!(from = %id, to = %copy.id, name = %copy.name, "duplicating profile");
        self.save(copy, true, None).await
    }

    /// Picks the first name not taken by any held profile, appending
    /// ".1", ".2", ... to the base name as needed.
    pub async fn first_unique_name(&self, name: &str) -> String {
        let state = self.state.read().await;
        let taken: HashSet<&str> = state
            .all_profiles
            .values()
            .map(|p| p.name.as_str())
            .collect();
        if !taken.contains(name) {
            return name.to_string();
        }
        let mut index = 1;
        loop {
            let candidate = format!("{name}.{index}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            index += 1;
        }
    }

    /// Deletes every profile from the remote repository.
    pub async fn erase_remotely_shared(&self) -> ProfileResult<()> {
        info!("erasing remotely shared profiles");
        if let Some(remote) = self.remote.read().await.clone() {
            remote.remove_all().await?;
        }
        Ok(())
    }

    /// Re-saves every held profile through the local stamping path.
    /// Used by migrations to refresh fingerprints in bulk.
    pub async fn resave_all(&self) {
        let profiles: Vec<Profile> = {
            let state = self.state.read().await;
            state.all_profiles.values().cloned().collect()
        };
        for profile in profiles {
            let id = profile.id;
            if let Err(e) = self.save(profile, true, None).await {
                warn!(profile_id = %id, error = %e, "unable to re-save profile");
            }
        }
    }

    // ── Projections ──────────────────────────────────────────────

    /// Whether all configured observers completed their initial fetch.
    pub async fn is_ready(&self) -> bool {
        self.state.read().await.waiting.is_empty()
    }

    /// Snapshot of the profile with the given ID.
    pub async fn profile(&self, id: &ProfileId) -> Option<Profile> {
        self.state.read().await.all_profiles.get(id).cloned()
    }

    /// IDs of all held profiles.
    pub async fn profile_ids(&self) -> HashSet<ProfileId> {
        self.state.read().await.all_profiles.keys().copied().collect()
    }

    /// Whether the profile is present in the remote repository.
    pub async fn is_remotely_shared(&self, id: &ProfileId) -> bool {
        self.state.read().await.remote_ids.contains(id)
    }

    /// Current header projection of every held profile.
    pub async fn headers(&self) -> HashMap<ProfileId, ProfileHeader> {
        let state = self.state.read().await;
        self.computed_headers(&state)
    }

    // ── Reload ───────────────────────────────────────────────────

    async fn reload_local(&self, profiles: Vec<Profile>) {
        info!(count = profiles.len(), "reloading local profiles");
        let excluded: Vec<ProfileId> = profiles
            .iter()
            .filter(|p| !self.is_included(p))
            .map(|p| p.id)
            .collect();

        let (headers, ready) = {
            let mut state = self.state.write().await;
            state.all_profiles = profiles
                .into_iter()
                .filter(|p| !excluded.contains(&p.id))
                .map(|p| (p.id, p))
                .collect();
            state.waiting.remove(&Observer::Local);
            let ready = state.waiting.is_empty() && !state.ready_sent;
            if ready {
                state.ready_sent = true;
            }
            (self.computed_headers(&state), ready)
        };
        self.events.send(ProfileEvent::HeadersRefreshed(headers));
        if ready {
            self.events.send(ProfileEvent::Ready);
        }

        if !excluded.is_empty() {
            info!(?excluded, "deleting excluded profiles from repository");
            let local = self.local.clone();
            tokio::spawn(async move {
                if let Err(e) = local.remove(&excluded).await {
                    warn!(error = %e, "unable to delete excluded profiles");
                }
            });
        }
    }

    async fn reload_remote(self: &Arc<Self>, profiles: Vec<Profile>) {
        info!(count = profiles.len(), "reloading remote profiles");
        let (headers, ready) = {
            let mut state = self.state.write().await;
            state.remote_ids = profiles.iter().map(|p| p.id).collect();
            state.waiting.remove(&Observer::Remote);
            let ready = state.waiting.is_empty() && !state.ready_sent;
            if ready {
                state.ready_sent = true;
            }
            (self.computed_headers(&state), ready)
        };
        self.events.send(ProfileEvent::HeadersRefreshed(headers));
        if ready {
            self.events.send(ProfileEvent::Ready);
        }

        self.events.send(ProfileEvent::RemoteImportStarted);
        self.start_import(profiles).await;
    }

    // ── Remote import ────────────────────────────────────────────

    /// Replaces the in-flight import task, if any, with one for the
    /// given snapshot. At most one import is ever running: a stale
    /// import deciding deletions against a newer snapshot would corrupt
    /// the set, so the previous task is cancelled and awaited first.
    async fn start_import(self: &Arc<Self>, profiles: Vec<Profile>) {
        let mut slot = self.import.lock().await;
        if let Some(previous) = slot.take() {
            info!("cancelling ongoing remote import");
            previous.cancel.store(true, Ordering::Relaxed);
            let _ = previous.handle.await;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(self);
        let flag = cancel.clone();
        let handle = tokio::spawn(async move {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            manager.import_remote(profiles, &flag).await;
            manager.events.send(ProfileEvent::RemoteImportFinished);
        });
        *slot = Some(ImportTask { cancel, handle });
    }

    async fn import_remote(&self, profiles: Vec<Profile>, cancel: &AtomicBool) {
        info!(count = profiles.len(), "importing remote profiles");
        let (local_fingerprints, remotely_deleted) = {
            let state = self.state.read().await;
            let fingerprints: HashMap<ProfileId, Fingerprint> = state
                .all_profiles
                .values()
                .filter_map(|p| p.attributes.fingerprint.map(|f| (p.id, f)))
                .collect();
            let remote_ids: HashSet<ProfileId> = profiles.iter().map(|p| p.id).collect();
            let deleted: Vec<ProfileId> = state
                .all_profiles
                .keys()
                .filter(|id| !remote_ids.contains(id))
                .copied()
                .collect();
            (fingerprints, deleted)
        };

        let mut ids_to_remove: Vec<ProfileId> = Vec::new();
        if !remotely_deleted.is_empty() {
            info!(
                ?remotely_deleted,
                mirrors = self.mirrors_remote,
                "local profiles not present in remote repository"
            );
            if self.mirrors_remote {
                ids_to_remove.extend(&remotely_deleted);
            }
        }

        for remote_profile in profiles {
            let id = remote_profile.id;
            if !self.is_included(&remote_profile) {
                info!(profile_id = %id, "will delete non-included remote profile");
                ids_to_remove.push(id);
            } else if is_already_imported(&local_fingerprints, &remote_profile) {
                info!(profile_id = %id, "skipping re-import of unchanged profile");
            } else {
                info!(profile_id = %id, "importing remote profile");
                if let Err(e) = self.save(remote_profile, false, None).await {
                    warn!(profile_id = %id, error = %e, "unable to import remote profile");
                }
            }
            if cancel.load(Ordering::Relaxed) {
                info!("remote import cancelled");
                return;
            }
        }

        if !ids_to_remove.is_empty() {
            info!(?ids_to_remove, "deleting stale profiles after import");
            if let Err(e) = self.local.remove(&ids_to_remove).await {
                warn!(error = %e, "unable to delete stale profiles");
            }
        }
        info!("finished importing remote profiles");
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn is_included(&self, profile: &Profile) -> bool {
        self.processor
            .as_ref()
            .is_none_or(|p| p.is_included(profile))
    }

    fn computed_headers(&self, state: &ManagerState) -> HashMap<ProfileId, ProfileHeader> {
        state
            .all_profiles
            .values()
            .map(|profile| {
                let mut flags = Vec::new();
                if state.remote_ids.contains(&profile.id) {
                    flags.push(if profile.attributes.available_for_tv {
                        SharingFlag::Tv
                    } else {
                        SharingFlag::Shared
                    });
                }
                let features: BTreeSet<Feature> = self
                    .processor
                    .as_ref()
                    .map(|p| p.required_features(profile))
                    .unwrap_or_default();
                (profile.id, ProfileHeader::new(profile, flags, features))
            })
            .collect()
    }

    async fn apply_saved(&self, profile: &Profile) {
        let headers = {
            let mut state = self.state.write().await;
            state.all_profiles.insert(profile.id, profile.clone());
            self.computed_headers(&state)
        };
        self.events.send(ProfileEvent::HeadersRefreshed(headers));
    }
}

impl Drop for ProfileManager {
    fn drop(&mut self) {
        for handle in self.subscriptions.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

/// A remote profile is already imported when the local copy carries a
/// fingerprint and the remote one does not differ from it. A remote
/// profile without a fingerprint never overwrites a fingerprinted local
/// copy.
fn is_already_imported(
    local_fingerprints: &HashMap<ProfileId, Fingerprint>,
    remote: &Profile,
) -> bool {
    match local_fingerprints.get(&remote.id) {
        Some(local) => match remote.attributes.fingerprint {
            Some(remote) => remote == *local,
            None => true,
        },
        None => false,
    }
}
