//! Partitioning of content units into lookup groups.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tapedeck_common::{Checksum, ContentUnit, EntityKind, EpisodeNumber, GroupKey};

use crate::metadata::provider::LookupKey;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("checksum {0} appears more than once in the batch")]
    DuplicateChecksum(Checksum),
}

/// The units that share one external query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupGroup {
    pub key: GroupKey,
    /// Sorted by episode, then checksum.
    pub members: Vec<ContentUnit>,
}

impl LookupGroup {
    pub fn entity_kind(&self) -> EntityKind {
        self.key.entity_kind()
    }

    /// The key providers are queried with for the whole group.
    pub fn lookup_key(&self) -> LookupKey {
        match &self.key {
            GroupKey::Movie { title, year } => LookupKey::Movie {
                title: title.clone(),
                year: *year,
            },
            GroupKey::Season { series, season } => LookupKey::Season {
                series: series.clone(),
                season: *season,
            },
        }
    }

    /// Episode lookup key for a member, `None` for movies.
    pub fn episode_key(&self, unit: &ContentUnit) -> Option<LookupKey> {
        let GroupKey::Season { series, .. } = &self.key else {
            return None;
        };
        let number = unit.episode_number()?;
        Some(LookupKey::Episode {
            series: series.clone(),
            season: number.season,
            episode: number.episode,
        })
    }

    /// Local episode inventory of the group.
    pub fn inventory(&self) -> BTreeSet<EpisodeNumber> {
        self.members
            .iter()
            .filter_map(ContentUnit::episode_number)
            .collect()
    }

    /// Distinct local episodes in order, each with the members holding it.
    pub fn episodes(&self) -> BTreeMap<EpisodeNumber, Vec<&ContentUnit>> {
        let mut out: BTreeMap<EpisodeNumber, Vec<&ContentUnit>> = BTreeMap::new();
        for unit in &self.members {
            if let Some(number) = unit.episode_number() {
                out.entry(number).or_default().push(unit);
            }
        }
        out
    }
}

/// Partition `units` into lookup groups ordered by key.
///
/// Series names are compared exactly, case included.
pub fn group_units(units: &[ContentUnit]) -> Result<Vec<LookupGroup>, GroupError> {
    let mut seen = HashSet::new();
    let mut groups: BTreeMap<GroupKey, Vec<ContentUnit>> = BTreeMap::new();

    for unit in units {
        if !seen.insert(&unit.checksum) {
            return Err(GroupError::DuplicateChecksum(unit.checksum.clone()));
        }
        groups.entry(unit.group_key()).or_default().push(unit.clone());
    }

    Ok(groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| {
                a.episode_number()
                    .cmp(&b.episode_number())
                    .then_with(|| a.checksum.as_str().cmp(b.checksum.as_str()))
            });
            LookupGroup { key, members }
        })
        .collect())
}
