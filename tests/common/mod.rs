//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tapedeck::metadata::provider::{
    Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId, ProviderRecord,
    RemoteListing,
};
use tapedeck::metadata::{CallPolicy, MergeResolver, ProviderRegistry};
use tapedeck::reconcile::{ReconcileOptions, Reconciler, SqliteRecordStore};
use tapedeck_common::{Checksum, ContentUnit, EpisodeNumber, GroupKey};
use tapedeck_db::pool::init_memory_pool;

/// Provider serving canned records, with an optional per-call delay.
pub struct FixtureProvider {
    id: ProviderId,
    records: HashMap<LookupKey, ProviderRecord>,
    delay: Duration,
    pub calls: Mutex<Vec<String>>,
}

impl FixtureProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            records: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, key: LookupKey, record: ProviderRecord) -> Self {
        self.records.insert(key, record);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MetadataProvider for FixtureProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports(&self, key: &LookupKey) -> bool {
        !matches!(key, LookupKey::File { .. })
    }

    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
        self.calls.lock().unwrap().push(format!("search {key}"));
        tokio::time::sleep(self.delay).await;
        if !self.records.contains_key(key) {
            return Ok(Vec::new());
        }
        Ok(vec![Candidate {
            id: key.to_string(),
            title: key.title().unwrap_or_default().to_string(),
            year: None,
            confidence: 1.0,
        }])
    }

    async fn fetch(
        &self,
        _candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError> {
        self.calls.lock().unwrap().push(format!("fetch {key}"));
        tokio::time::sleep(self.delay).await;
        self.records
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(self.id, key))
    }
}

pub fn checksum(s: &str) -> Checksum {
    Checksum::parse(s).unwrap()
}

pub fn episode(c: &str, series: &str, season: u32, episode: u32) -> ContentUnit {
    ContentUnit::episode(checksum(c), series, season, episode)
}

pub fn season_key(series: &str, season: u32) -> LookupKey {
    LookupKey::Season {
        series: series.into(),
        season,
    }
}

pub fn episode_key(series: &str, season: u32, episode: u32) -> LookupKey {
    LookupKey::Episode {
        series: series.into(),
        season,
        episode,
    }
}

pub fn season_group(series: &str, season: u32) -> GroupKey {
    GroupKey::Season {
        series: series.into(),
        season,
    }
}

/// A storefront season record listing episodes `1..=count`.
pub fn listed_season(season: u32, count: u32) -> ProviderRecord {
    let mut record = ProviderRecord::new(ProviderId::Scrape)
        .with("network", "FX")
        .with("genre", "Crime");
    record.listing = Some(RemoteListing {
        url: format!("https://store.example/fargo/season-{season}"),
        episodes: (1..=count).map(|e| EpisodeNumber::new(season, e)).collect(),
    });
    record
}

pub fn build(
    providers: Vec<Arc<dyn MetadataProvider>>,
    options: ReconcileOptions,
) -> (Reconciler, SqliteRecordStore) {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }
    let store = SqliteRecordStore::new(init_memory_pool().unwrap());
    let reconciler = Reconciler::new(
        &registry,
        MergeResolver::default(),
        Arc::new(store.clone()),
        CallPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            ..CallPolicy::default()
        },
        options,
    );
    (reconciler, store)
}
