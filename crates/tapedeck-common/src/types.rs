//! Content kinds and lookup group keys.
//!
//! A [`ContentUnit`] is one imported file. Its [`ContentKind`] decides which
//! [`GroupKey`] it belongs to: movies group by title and year, episodes by
//! series and season.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{Checksum, EpisodeNumber};

/// Broad entity kind used for field applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A feature film.
    Movie,
    /// A TV series episode (or the series/season it belongs to).
    Tv,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Tv => write!(f, "tv"),
        }
    }
}

/// What a content unit is, with the keys needed to group it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentKind {
    Movie {
        title: String,
        #[serde(default)]
        year: Option<u16>,
    },
    Episode {
        series: String,
        season: u32,
        episode: u32,
    },
}

/// One physical video file, identified by its content checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentUnit {
    pub checksum: Checksum,
    #[serde(flatten)]
    pub kind: ContentKind,
}

impl ContentUnit {
    /// Build a movie unit.
    pub fn movie(checksum: Checksum, title: impl Into<String>, year: Option<u16>) -> Self {
        Self {
            checksum,
            kind: ContentKind::Movie {
                title: title.into(),
                year,
            },
        }
    }

    /// Build an episode unit.
    pub fn episode(checksum: Checksum, series: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            checksum,
            kind: ContentKind::Episode {
                series: series.into(),
                season,
                episode,
            },
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self.kind {
            ContentKind::Movie { .. } => EntityKind::Movie,
            ContentKind::Episode { .. } => EntityKind::Tv,
        }
    }

    /// The `(season, episode)` pair for episodes, `None` for movies.
    pub fn episode_number(&self) -> Option<EpisodeNumber> {
        match self.kind {
            ContentKind::Episode {
                season, episode, ..
            } => Some(EpisodeNumber::new(season, episode)),
            ContentKind::Movie { .. } => None,
        }
    }

    /// The lookup group this unit belongs to.
    pub fn group_key(&self) -> GroupKey {
        match &self.kind {
            ContentKind::Movie { title, year } => GroupKey::Movie {
                title: title.clone(),
                year: *year,
            },
            ContentKind::Episode { series, season, .. } => GroupKey::Season {
                series: series.clone(),
                season: *season,
            },
        }
    }
}

/// Key of a lookup group. Series keys are compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GroupKey {
    Movie { title: String, year: Option<u16> },
    Season { series: String, season: u32 },
}

impl GroupKey {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Movie { .. } => EntityKind::Movie,
            Self::Season { .. } => EntityKind::Tv,
        }
    }

    /// Season number for TV groups.
    pub fn season(&self) -> Option<u32> {
        match self {
            Self::Season { season, .. } => Some(*season),
            Self::Movie { .. } => None,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie {
                title,
                year: Some(year),
            } => write!(f, "movie:{title} ({year})"),
            Self::Movie { title, year: None } => write!(f, "movie:{title}"),
            Self::Season { series, season } => write!(f, "tv:{series}:S{season:02}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum(s: &str) -> Checksum {
        Checksum::parse(s).unwrap()
    }

    #[test]
    fn episode_unit_keys() {
        let unit = ContentUnit::episode(checksum("aa01"), "Fargo", 1, 7);
        assert_eq!(unit.entity_kind(), EntityKind::Tv);
        assert_eq!(unit.episode_number(), Some(EpisodeNumber::new(1, 7)));
        assert_eq!(
            unit.group_key(),
            GroupKey::Season {
                series: "Fargo".into(),
                season: 1
            }
        );
    }

    #[test]
    fn movie_unit_keys() {
        let unit = ContentUnit::movie(checksum("bb02"), "Heat", Some(1995));
        assert_eq!(unit.entity_kind(), EntityKind::Movie);
        assert_eq!(unit.episode_number(), None);
        assert_eq!(unit.group_key().to_string(), "movie:Heat (1995)");
    }

    #[test]
    fn group_key_display() {
        let key = GroupKey::Season {
            series: "The Expanse".into(),
            season: 3,
        };
        assert_eq!(key.to_string(), "tv:The Expanse:S03");
        let key = GroupKey::Movie {
            title: "Heat".into(),
            year: None,
        };
        assert_eq!(key.to_string(), "movie:Heat");
    }

    #[test]
    fn content_unit_serde_shape() {
        let json = r#"{"checksum":"cc03","kind":"episode","series":"Fargo","season":2,"episode":1}"#;
        let unit: ContentUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit, ContentUnit::episode(checksum("cc03"), "Fargo", 2, 1));

        let json = r#"{"checksum":"dd04","kind":"movie","title":"Heat"}"#;
        let unit: ContentUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit, ContentUnit::movie(checksum("dd04"), "Heat", None));
    }
}
