//! REST mapper over a provider API endpoint.
//!
//! Fetches the provider index and per-provider infrastructure as plain
//! JSON. Infrastructure requests carry the cached validators as
//! `If-Modified-Since` / `If-None-Match`; a 304 response maps to the
//! `NotModified` outcome and never surfaces as an error.

use crate::error::{ProviderError, ProviderResult};
use crate::mapper::InfrastructureMapper;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use tunnelsync_types::{Provider, ProviderCache, ProviderId, ProviderInfrastructure};

/// Configuration for a [`RestMapper`].
#[derive(Debug, Clone)]
pub struct RestMapperConfig {
    /// Base URL of the provider API (e.g. `https://api.example.com/v1`).
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RestMapperConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    providers: Vec<Provider>,
}

/// An [`InfrastructureMapper`] over a plain JSON REST endpoint.
pub struct RestMapper {
    config: RestMapperConfig,
    client: Client,
}

impl RestMapper {
    /// Creates a mapper for the given endpoint.
    pub fn new(config: RestMapperConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to create HTTP client");
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl InfrastructureMapper for RestMapper {
    async fn index(&self) -> ProviderResult<Vec<Provider>> {
        let url = self.url("index.json");
        info!(%url, "fetching provider index");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let index: IndexResponse = response.json().await?;
        Ok(index.providers)
    }

    async fn infrastructure(
        &self,
        provider_id: &ProviderId,
        cache: Option<&ProviderCache>,
    ) -> ProviderResult<ProviderInfrastructure> {
        let url = self.url(&format!("providers/{provider_id}/fetch.json"));
        info!(%url, "fetching provider infrastructure");

        let mut request = self.client.get(&url);
        if let Some(last_update) = cache.and_then(|c| c.last_update) {
            request = request.header(IF_MODIFIED_SINCE, http_date(last_update));
        }
        if let Some(tag) = cache.and_then(|c| c.tag.as_deref()) {
            request = request.header(IF_NONE_MATCH, tag);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(%provider_id, "infrastructure not modified");
            return Err(ProviderError::NotModified);
        }
        let response = response.error_for_status()?;

        let last_update = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        let tag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut infrastructure: ProviderInfrastructure = response.json().await?;
        if last_update.is_some() || tag.is_some() {
            infrastructure.cache = Some(ProviderCache { last_update, tag });
        }
        Ok(infrastructure)
    }
}

/// Formats a timestamp as an IMF-fixdate (RFC 7231) header value.
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an HTTP date header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
