//! Provider infrastructure cache for tunnelsync.
//!
//! Maintains, per VPN provider, a locally cached snapshot of the
//! provider's server/preset infrastructure. Snapshots are fetched
//! through pluggable mappers with conditional-request caching
//! (`If-Modified-Since` / `If-None-Match`), concurrent fetches are
//! deduplicated, and an anti-regression rule prevents a stale snapshot
//! from replacing a fresher one.
//!
//! # Components
//!
//! - **Mapper**: the fetch seam ([`InfrastructureMapper`]); the
//!   [`RestMapper`] implementation talks plain JSON over HTTP
//! - **Store**: the storage seam ([`ApiRepository`]) with an in-memory
//!   implementation enforcing the freshness rule
//! - **Manager**: fetch orchestration and deduplication
//!   ([`InfrastructureManager`])
//! - **Query**: pure filter/sort functions over server lists

mod error;
mod filters;
mod manager;
mod mapper;
mod query;
mod repository;
mod rest;
mod store;

pub use error::{ProviderError, ProviderResult};
pub use filters::{ProviderFilterOptions, ProviderFilters, ProviderSortField};
pub use manager::{InfrastructureManager, ProviderEvent};
pub use mapper::InfrastructureMapper;
pub use query::{available_options, filtered_servers};
pub use repository::ProviderRepository;
pub use rest::{RestMapper, RestMapperConfig, http_date, parse_http_date};
pub use store::{ApiRepository, InMemoryApiRepository};
