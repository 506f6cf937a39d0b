//! Concrete metadata provider implementations.
//!
//! Each sub-module contains a single provider that implements the
//! [`MetadataProvider`](super::provider::MetadataProvider) trait.

pub mod http;
pub mod omdb;
pub mod probe;
pub mod scrape;
pub mod tmdb;
pub mod tvdb;
pub mod tvmaze;

pub use omdb::OmdbProvider;
pub use probe::ProbeIngest;
pub use scrape::ScrapeIngest;
pub use tmdb::TmdbProvider;
pub use tvdb::TvdbProvider;
pub use tvmaze::TvmazeProvider;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use self::http::ApiClient;
use super::provider::ProviderId;
use super::registry::ProviderRegistry;
use crate::config::ProvidersConfig;

/// Build a registry holding every provider, configured or not.
///
/// Unconfigured providers report themselves unavailable and are skipped by
/// the orchestrator.
pub fn build_registry(config: &ProvidersConfig, timeout: Duration) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    registry.register(Arc::new(ScrapeIngest::new(
        config.scrape.dir.clone().unwrap_or_default(),
        config.scrape.enabled,
    )));
    registry.register(Arc::new(ProbeIngest::new(
        config.probe.dir.clone().unwrap_or_default(),
        config.probe.enabled,
    )));

    let tmdb = &config.tmdb;
    registry.register(Arc::new(TmdbProvider::new(
        ApiClient::new(
            ProviderId::Tmdb,
            tmdb.base_url.as_deref().unwrap_or(tmdb::TMDB_BASE_URL),
            tmdb.requests_per_second,
            timeout,
        )?,
        tmdb.api_key.clone(),
        tmdb.language.clone(),
    )));

    let omdb = &config.omdb;
    registry.register(Arc::new(OmdbProvider::new(
        ApiClient::new(
            ProviderId::Omdb,
            omdb.base_url.as_deref().unwrap_or(omdb::OMDB_BASE_URL),
            omdb.requests_per_second,
            timeout,
        )?,
        omdb.api_key.clone(),
    )));

    let tvdb = &config.tvdb;
    registry.register(Arc::new(TvdbProvider::new(
        ApiClient::new(
            ProviderId::Tvdb,
            tvdb.base_url.as_deref().unwrap_or(tvdb::TVDB_BASE_URL),
            tvdb.requests_per_second,
            timeout,
        )?,
        tvdb.api_key.clone(),
    )));

    let tvmaze = &config.tvmaze;
    registry.register(Arc::new(TvmazeProvider::new(
        ApiClient::new(
            ProviderId::Tvmaze,
            tvmaze.base_url.as_deref().unwrap_or(tvmaze::TVMAZE_BASE_URL),
            tvmaze.requests_per_second,
            timeout,
        )?,
        tvmaze.enabled,
    )));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_registers_everything() {
        let registry = build_registry(&ProvidersConfig::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(registry.len(), 6);
        // Only TVmaze works without keys or directories.
        let available: Vec<_> = registry.available().iter().map(|p| p.id()).collect();
        assert_eq!(available, vec![ProviderId::Tvmaze]);
    }
}
