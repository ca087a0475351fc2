//! Profile reconciliation engine for tunnelsync.
//!
//! Keeps a user's VPN profile catalog consistent across a local
//! repository (always present) and an optional remote, shared
//! repository. The [`ProfileManager`] owns the authoritative in-memory
//! profile map, derives read-only header projections for the UI, and
//! runs a cancellable background import whenever the remote source
//! emits a new snapshot.
//!
//! # Components
//!
//! - **Repository**: narrow reader/writer seam over the backing store,
//!   with a change stream of full snapshots
//! - **Processor**: externally supplied business rules (inclusion
//!   predicate, required features, pre-save rewrite)
//! - **Manager**: the single-writer reconciler and import loop
//! - **Events**: fan-out stream of reconciler change events
//!
//! # Conflict policy
//!
//! Every local save stamps a fresh fingerprint. During a remote import,
//! a profile whose remote fingerprint equals the local one is skipped;
//! any other remote version wins and overwrites the local copy. There
//! is no three-way merge.

mod error;
mod event;
mod manager;
mod memory;
mod processor;
mod repository;

pub use error::{ProfileError, ProfileResult};
pub use event::ProfileEvent;
pub use manager::{ProfileManager, ProfileManagerConfig};
pub use memory::InMemoryProfileRepository;
pub use processor::ProfileProcessor;
pub use repository::ProfileRepository;
