//! Core type definitions for tunnelsync.
//!
//! This crate defines the fundamental types shared by the profile
//! reconciler and the provider-infrastructure cache:
//! - Profile and provider identifiers
//! - The immutable `Profile` value and its UI-facing `ProfileHeader`
//!   projection
//! - Provider catalog types (`Provider`, `ProviderServer`,
//!   `ProviderPreset`, `ProviderInfrastructure`) and the conditional
//!   fetch token (`ProviderCache`)
//!
//! Engine behavior (reconciliation, fetching, querying) lives in the
//! `tunnelsync-profiles` and `tunnelsync-providers` crates.

mod ids;
mod profile;
mod provider;

pub use ids::{Fingerprint, ModuleId, ModuleType, ProfileId, ProviderId};
pub use profile::{Feature, Module, Profile, ProfileAttributes, ProfileHeader, SharingFlag};
pub use provider::{
    Provider, ProviderCache, ProviderInfrastructure, ProviderPreset, ProviderServer,
    ServerMetadata,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
