//! Episode completeness verification.
//!
//! Compares the episodes held locally for a season with the listing the
//! storefront advertises. Missing episodes stop the whole run; the
//! diagnostic is a [`MissingEpisodeReport`] written for the operator.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tapedeck_common::{EpisodeNumber, GroupKey};

use super::group::LookupGroup;
use crate::metadata::provider::RemoteListing;

/// Handling of local episodes the remote listing does not mention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlistedEpisodePolicy {
    /// Accept the group and log a warning.
    #[default]
    Warn,
    /// Treat it like a missing episode.
    Halt,
}

/// Accepted outcome of verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Local and remote inventories are identical.
    Complete,
    /// Every remote episode is present, plus local extras.
    UnlistedLocal { extra: Vec<EpisodeNumber> },
    /// No remote listing to compare against.
    Unverified,
    /// Movies are not verified.
    NotApplicable,
}

/// Diagnostic written when a season fails verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEpisodeReport {
    pub series: String,
    pub season: u32,
    pub local: Vec<EpisodeNumber>,
    pub remote: Vec<EpisodeNumber>,
    /// Remote episodes with no local file, ascending.
    pub missing: Vec<EpisodeNumber>,
    /// Local episodes absent from the listing; only set under [`UnlistedEpisodePolicy::Halt`].
    pub unlisted: Vec<EpisodeNumber>,
    pub url: String,
}

fn list(episodes: &[EpisodeNumber]) -> String {
    if episodes.is_empty() {
        return "None".to_string();
    }
    episodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl MissingEpisodeReport {
    /// Plain-text form of the report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Series: {}", self.series);
        let _ = writeln!(out, "Season: {}", self.season);
        let _ = writeln!(out, "Local episodes: {}", list(&self.local));
        let _ = writeln!(out, "Remote episodes: {}", list(&self.remote));
        let _ = writeln!(out, "Missing episodes: {}", list(&self.missing));
        if !self.unlisted.is_empty() {
            let _ = writeln!(out, "Unlisted local episodes: {}", list(&self.unlisted));
        }
        let _ = writeln!(out, "URL: {}", self.url);
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.render())
    }
}

impl std::fmt::Display for MissingEpisodeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} season {}: ", self.series, self.season)?;
        if self.missing.is_empty() {
            write!(f, "unlisted local episodes {}", list(&self.unlisted))
        } else {
            write!(f, "missing episodes {}", list(&self.missing))
        }
    }
}

/// Check a group's local episodes against the remote listing.
pub fn verify(
    group: &LookupGroup,
    remote: Option<&RemoteListing>,
    policy: UnlistedEpisodePolicy,
) -> Result<Verdict, MissingEpisodeReport> {
    let GroupKey::Season { series, season } = &group.key else {
        return Ok(Verdict::NotApplicable);
    };
    let Some(listing) = remote else {
        return Ok(Verdict::Unverified);
    };

    let local = group.inventory();
    let remote: BTreeSet<EpisodeNumber> = listing
        .episodes
        .iter()
        .filter(|e| e.season == *season)
        .copied()
        .collect();

    let missing: Vec<EpisodeNumber> = remote.difference(&local).copied().collect();
    let extra: Vec<EpisodeNumber> = local.difference(&remote).copied().collect();

    if missing.is_empty() && extra.is_empty() {
        return Ok(Verdict::Complete);
    }
    if missing.is_empty() && policy == UnlistedEpisodePolicy::Warn {
        return Ok(Verdict::UnlistedLocal { extra });
    }

    Err(MissingEpisodeReport {
        series: series.clone(),
        season: *season,
        local: local.into_iter().collect(),
        remote: remote.into_iter().collect(),
        missing,
        unlisted: if policy == UnlistedEpisodePolicy::Halt {
            extra
        } else {
            Vec::new()
        },
        url: listing.url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::group::group_units;
    use tapedeck_common::{Checksum, ContentUnit};

    fn season(episodes: &[u32]) -> LookupGroup {
        let units: Vec<_> = episodes
            .iter()
            .map(|e| ContentUnit::episode(Checksum::parse(format!("{e:02x}")).unwrap(), "Fargo", 1, *e))
            .collect();
        group_units(&units).unwrap().remove(0)
    }

    fn listing(episodes: &[(u32, u32)]) -> RemoteListing {
        RemoteListing {
            url: "https://store.example/fargo-1".into(),
            episodes: episodes.iter().map(|(s, e)| EpisodeNumber::new(*s, *e)).collect(),
        }
    }

    #[test]
    fn equal_inventories_are_complete() {
        let group = season(&[1, 2, 3, 4, 5, 6]);
        let remote = listing(&[(1, 1), (1, 2), (1, 3), (1, 4), (1, 5), (1, 6)]);
        assert_eq!(verify(&group, Some(&remote), UnlistedEpisodePolicy::Warn), Ok(Verdict::Complete));
    }

    #[test]
    fn missing_episodes_fail() {
        let group = season(&[1, 2, 3, 4, 5, 6]);
        let remote = listing(&(1..=8).map(|e| (1, e)).collect::<Vec<_>>());
        let report = verify(&group, Some(&remote), UnlistedEpisodePolicy::Warn).unwrap_err();
        assert_eq!(report.missing, vec![EpisodeNumber::new(1, 7), EpisodeNumber::new(1, 8)]);
        assert_eq!(report.local.len(), 6);
        assert_eq!(report.remote.len(), 8);
        assert!(report.unlisted.is_empty());
    }

    #[test]
    fn other_seasons_in_listing_are_ignored() {
        let group = season(&[1, 2]);
        let remote = listing(&[(1, 1), (1, 2), (2, 1), (2, 2)]);
        assert_eq!(verify(&group, Some(&remote), UnlistedEpisodePolicy::Halt), Ok(Verdict::Complete));
    }

    #[test]
    fn unlisted_local_follows_policy() {
        let group = season(&[1, 2, 3]);
        let remote = listing(&[(1, 1), (1, 2)]);
        assert_eq!(
            verify(&group, Some(&remote), UnlistedEpisodePolicy::Warn),
            Ok(Verdict::UnlistedLocal {
                extra: vec![EpisodeNumber::new(1, 3)]
            })
        );
        let report = verify(&group, Some(&remote), UnlistedEpisodePolicy::Halt).unwrap_err();
        assert!(report.missing.is_empty());
        assert_eq!(report.unlisted, vec![EpisodeNumber::new(1, 3)]);
    }

    #[test]
    fn no_listing_is_unverified() {
        let group = season(&[1]);
        assert_eq!(verify(&group, None, UnlistedEpisodePolicy::Halt), Ok(Verdict::Unverified));
    }

    #[test]
    fn movies_are_not_verified() {
        let units = vec![ContentUnit::movie(Checksum::parse("aa").unwrap(), "Heat", None)];
        let group = group_units(&units).unwrap().remove(0);
        assert_eq!(
            verify(&group, Some(&listing(&[(1, 1)])), UnlistedEpisodePolicy::Halt),
            Ok(Verdict::NotApplicable)
        );
    }

    #[test]
    fn report_renders_in_order() {
        let group = season(&[1, 2]);
        let remote = listing(&[(1, 1), (1, 2), (1, 3)]);
        let report = verify(&group, Some(&remote), UnlistedEpisodePolicy::Warn).unwrap_err();
        assert_eq!(
            report.render(),
            "Series: Fargo\n\
             Season: 1\n\
             Local episodes: S01E01, S01E02\n\
             Remote episodes: S01E01, S01E02, S01E03\n\
             Missing episodes: S01E03\n\
             URL: https://store.example/fargo-1\n"
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missingepisodes.txt");
        report.write_to(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), report.render());
    }
}
