//! Provider queries for one lookup group.
//!
//! Every provider is asked once per group key. A catalog whose identifier is
//! already in the stored group record is fetched by that id; the others are
//! searched. A provider that found the group is then asked for each locally
//! known episode with the same candidate, and providers reading per-file data
//! are asked once per member. All calls of a group run concurrently; nothing
//! is merged here.

use std::collections::BTreeMap;

use futures::future::{join, join_all};
use tapedeck_common::{Checksum, EpisodeNumber};
use tracing::{debug, warn};

use super::group::LookupGroup;
use crate::metadata::client::{Lookup, ProviderClient};
use crate::metadata::merge::MergedRecord;
use crate::metadata::provider::{Candidate, LookupKey, ProviderError, ProviderRecord, RemoteListing};

/// Records returned for one group, each list sorted by provider.
#[derive(Debug, Default)]
pub struct Harvest {
    pub group: Vec<ProviderRecord>,
    pub episodes: BTreeMap<EpisodeNumber, Vec<ProviderRecord>>,
    pub files: BTreeMap<Checksum, Vec<ProviderRecord>>,
}

impl Harvest {
    /// Remote episode listing from the highest ranked provider that has one.
    pub fn listing(&self) -> Option<&RemoteListing> {
        self.group.iter().find_map(|r| r.listing.as_ref())
    }

    /// Episode and file records for one member: the specific layer of its merge.
    pub fn specific_for(&self, checksum: &Checksum, episode: Option<EpisodeNumber>) -> Vec<ProviderRecord> {
        let episode_records = episode
            .and_then(|number| self.episodes.get(&number))
            .into_iter()
            .flatten();
        let file_records = self.files.get(checksum).into_iter().flatten();
        episode_records.chain(file_records).cloned().collect()
    }

    fn sort(&mut self) {
        self.group.sort_by_key(|r| r.provider);
        for records in self.episodes.values_mut() {
            records.sort_by_key(|r| r.provider);
        }
        for records in self.files.values_mut() {
            records.sort_by_key(|r| r.provider);
        }
    }
}

struct ProviderHarvest {
    group: Option<ProviderRecord>,
    episodes: Vec<(EpisodeNumber, ProviderRecord)>,
    files: Vec<(Checksum, ProviderRecord)>,
}

/// Query every client for `group`.
///
/// `stored` is the group's record from an earlier run, if any.
pub async fn harvest(
    clients: &[ProviderClient],
    group: &LookupGroup,
    stored: Option<&MergedRecord>,
) -> Harvest {
    let results = join_all(
        clients
            .iter()
            .map(|client| harvest_provider(client, group, stored)),
    )
    .await;

    let mut harvest = Harvest::default();
    for result in results {
        if let Some(record) = result.group {
            harvest.group.push(record);
        }
        for (number, record) in result.episodes {
            harvest.episodes.entry(number).or_default().push(record);
        }
        for (checksum, record) in result.files {
            harvest.files.entry(checksum).or_default().push(record);
        }
    }
    harvest.sort();
    harvest
}

async fn harvest_provider(
    client: &ProviderClient,
    group: &LookupGroup,
    stored: Option<&MergedRecord>,
) -> ProviderHarvest {
    let ((group_record, episodes), files) = join(
        harvest_catalog(client, group, stored),
        harvest_files(client, group),
    )
    .await;
    ProviderHarvest {
        group: group_record,
        episodes,
        files,
    }
}

/// The candidate for a provider whose id is already stored for the group.
fn stored_candidate(
    client: &ProviderClient,
    key: &LookupKey,
    stored: Option<&MergedRecord>,
) -> Option<Candidate> {
    let id = stored?.value(client.id().identifier_field()?)?;
    Some(Candidate {
        id: id.to_string(),
        title: key.title().unwrap_or_default().to_string(),
        year: None,
        confidence: 1.0,
    })
}

async fn harvest_catalog(
    client: &ProviderClient,
    group: &LookupGroup,
    stored: Option<&MergedRecord>,
) -> (Option<ProviderRecord>, Vec<(EpisodeNumber, ProviderRecord)>) {
    let key = group.lookup_key();
    if !client.supports(&key) {
        return (None, Vec::new());
    }

    let resolved: Result<Option<Candidate>, ProviderError> =
        match stored_candidate(client, &key, stored) {
            Some(candidate) => {
                debug!(
                    provider = %client.id(),
                    group = %group.key,
                    id = %candidate.id,
                    "Using stored id, skipping search"
                );
                Ok(Some(candidate))
            }
            None => client.resolve(&key).await,
        };
    let candidate = match resolved {
        Ok(Some(candidate)) => candidate,
        Ok(None) => {
            debug!(provider = %client.id(), group = %group.key, "No candidate for group");
            return (None, Vec::new());
        }
        Err(e) => {
            warn!(provider = %client.id(), group = %group.key, error = %e, "Search failed, treating provider as absent");
            return (None, Vec::new());
        }
    };
    let candidate = &candidate;

    let episode_fetches: Vec<(EpisodeNumber, LookupKey)> = group
        .episodes()
        .into_iter()
        .filter_map(|(number, members)| {
            let episode_key = group.episode_key(members.first()?)?;
            client.supports(&episode_key).then_some((number, episode_key))
        })
        .collect();

    let (group_lookup, episode_lookups) = join(
        client.fetch(candidate, &key),
        join_all(episode_fetches.into_iter().map(|(number, episode_key)| async move {
            (number, client.fetch(candidate, &episode_key).await)
        })),
    )
    .await;

    let episodes = episode_lookups
        .into_iter()
        .filter_map(|(number, lookup)| lookup.into_record().map(|record| (number, record)))
        .collect();
    (group_lookup.into_record(), episodes)
}

async fn harvest_files(client: &ProviderClient, group: &LookupGroup) -> Vec<(Checksum, ProviderRecord)> {
    let kind = group.entity_kind();
    let lookups = group.members.iter().filter_map(|member| {
        let key = LookupKey::File {
            checksum: member.checksum.clone(),
            kind,
        };
        if !client.supports(&key) {
            return None;
        }
        Some(async move {
            let lookup = client.lookup(&key).await;
            (member.checksum.clone(), lookup)
        })
    });

    join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(checksum, lookup)| match lookup {
            Lookup::Found(record) => Some((checksum, record)),
            Lookup::NotFound | Lookup::Failed(_) => None,
        })
        .collect()
}
