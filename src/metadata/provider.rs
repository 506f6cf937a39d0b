//! Trait definition and types for metadata providers.
//!
//! This module defines the [`MetadataProvider`] trait that every metadata
//! source (storefront scrape ingest, local probe ingest, TMDB, OMDb, TheTVDB,
//! TVmaze) implements, along with the lookup keys, search candidates and raw
//! [`ProviderRecord`]s they exchange with the reconciliation engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tapedeck_common::{Checksum, EntityKind, EpisodeNumber};

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// Identifier of a metadata source.
///
/// Priority tables name providers by these lowercase identifiers; unknown
/// names are rejected when configuration is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Streaming storefront page scrape.
    Scrape,
    /// Local media probe output.
    Probe,
    /// The Movie Database.
    Tmdb,
    /// OMDb (IMDb data).
    Omdb,
    /// TheTVDB.
    Tvdb,
    /// TVmaze.
    Tvmaze,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::Scrape,
        ProviderId::Probe,
        ProviderId::Tmdb,
        ProviderId::Omdb,
        ProviderId::Tvdb,
        ProviderId::Tvmaze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Probe => "probe",
            Self::Tmdb => "tmdb",
            Self::Omdb => "omdb",
            Self::Tvdb => "tvdb",
            Self::Tvmaze => "tvmaze",
        }
    }

    /// The identifier field holding this provider's own candidate id.
    ///
    /// A stored value lets the provider be fetched by id instead of searched.
    pub fn identifier_field(&self) -> Option<&'static str> {
        match self {
            Self::Tmdb => Some("tmdb"),
            Self::Omdb => Some("imdb"),
            Self::Tvdb => Some("tvdb"),
            Self::Tvmaze => Some("tvmaze"),
            Self::Scrape | Self::Probe => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Lookup keys and search candidates
// ---------------------------------------------------------------------------

/// What a provider is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    /// A movie title, optionally narrowed by release year.
    Movie { title: String, year: Option<u16> },
    /// One season of a series.
    Season { series: String, season: u32 },
    /// One episode of a series.
    Episode {
        series: String,
        season: u32,
        episode: u32,
    },
    /// One physical file, for providers that read per-file data.
    File { checksum: Checksum, kind: EntityKind },
}

impl LookupKey {
    /// The title used for catalog searches (movie title or series name).
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Movie { title, .. } => Some(title),
            Self::Season { series, .. } | Self::Episode { series, .. } => Some(series),
            Self::File { .. } => None,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Movie { .. } => EntityKind::Movie,
            Self::Season { .. } | Self::Episode { .. } => EntityKind::Tv,
            Self::File { kind, .. } => *kind,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie {
                title,
                year: Some(year),
            } => write!(f, "{title} ({year})"),
            Self::Movie { title, year: None } => write!(f, "{title}"),
            Self::Season { series, season } => write!(f, "{series} S{season:02}"),
            Self::Episode {
                series,
                season,
                episode,
            } => write!(f, "{series} {}", EpisodeNumber::new(*season, *episode)),
            Self::File { checksum, .. } => write!(f, "file {checksum}"),
        }
    }
}

/// A single result returned from a provider search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Provider-specific identifier (catalog id, document path, ...).
    pub id: String,
    /// Display title of the match.
    pub title: String,
    /// Release or premiere year, if known.
    pub year: Option<u16>,
    /// How confident the provider is that this matches the key (0.0 - 1.0).
    pub confidence: f64,
}

/// Pick the best candidate: highest confidence, ties broken by id so the
/// choice never depends on response order.
pub fn best_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.id.cmp(&a.id))
    })
}

/// Score a search hit by title similarity and year proximity.
pub fn title_confidence(
    query_title: &str,
    result_title: &str,
    query_year: Option<u16>,
    result_year: Option<u16>,
) -> f64 {
    let base = if query_title == result_title {
        0.5
    } else if query_title.eq_ignore_ascii_case(result_title) {
        0.4
    } else if result_title
        .to_ascii_lowercase()
        .contains(&query_title.to_ascii_lowercase())
    {
        0.2
    } else {
        0.1
    };

    let year_bonus = match (query_year, result_year) {
        (Some(q), Some(r)) if q == r => 0.3,
        (Some(q), Some(r)) if q.abs_diff(r) <= 1 => 0.15,
        _ => 0.0,
    };

    base + year_bonus
}

// ---------------------------------------------------------------------------
// Provider records
// ---------------------------------------------------------------------------

/// Episode listing advertised by the authoritative remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListing {
    /// Page the listing was read from.
    pub url: String,
    /// Every `(season, episode)` pair the page lists.
    pub episodes: BTreeSet<EpisodeNumber>,
}

/// Raw output of one provider for one lookup target.
///
/// A field missing from `fields` is absent. Present values are kept
/// verbatim; shape validation happens at merge time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider: ProviderId,
    pub fields: BTreeMap<String, String>,
    pub listing: Option<RemoteListing>,
}

impl ProviderRecord {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            fields: BTreeMap::new(),
            listing: None,
        }
    }

    /// Builder-style field insert.
    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Insert `value` only when present.
    pub fn set_opt(&mut self, field: &str, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.set(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.listing.is_none()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure modes surfaced by a provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Transient failure (transport error, 5xx, timeout). Retryable.
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: ProviderId, message: String },

    /// The provider has nothing for this key. Terminal for this provider only.
    #[error("{provider} has no match for {key}")]
    NotFound { provider: ProviderId, key: String },

    /// The provider asked us to slow down. Retryable with a longer backoff.
    #[error("{provider} rate limited")]
    RateLimited {
        provider: ProviderId,
        retry_after: Option<Duration>,
    },

    /// The provider answered with data that failed shape validation.
    #[error("{provider} returned malformed data: {message}")]
    Malformed { provider: ProviderId, message: String },
}

impl ProviderError {
    pub fn unavailable(provider: ProviderId, message: impl fmt::Display) -> Self {
        Self::Unavailable {
            provider,
            message: message.to_string(),
        }
    }

    pub fn not_found(provider: ProviderId, key: &LookupKey) -> Self {
        Self::NotFound {
            provider,
            key: key.to_string(),
        }
    }

    pub fn malformed(provider: ProviderId, message: impl fmt::Display) -> Self {
        Self::Malformed {
            provider,
            message: message.to_string(),
        }
    }

    pub fn provider(&self) -> ProviderId {
        match self {
            Self::Unavailable { provider, .. }
            | Self::NotFound { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Malformed { provider, .. } => *provider,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::RateLimited { .. })
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Async trait that all metadata providers implement.
///
/// Providers differ only in transport. None of them merge: they report what
/// their source says and leave priority decisions to the merge resolver.
///
/// Providers are shared across tasks behind an `Arc`.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Identifier used in priority tables.
    fn id(&self) -> ProviderId;

    /// Returns `true` when the provider is configured (credentials present,
    /// ingest directory readable) and ready to serve requests.
    fn is_available(&self) -> bool;

    /// Whether this provider answers lookups of this shape at all.
    fn supports(&self, key: &LookupKey) -> bool;

    /// Find candidates for a key. An empty list means no match.
    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError>;

    /// Fetch the record for `key` using a candidate from a previous search.
    ///
    /// For [`LookupKey::Episode`] the candidate is the one found for the
    /// episode's season (or series).
    async fn fetch(
        &self,
        candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError>;
}
