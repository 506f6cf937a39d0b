//! Storefront scrape ingest.
//!
//! The external scraper drops one JSON document per storefront page into a
//! directory. A document looks like:
//!
//! ```json
//! {
//!   "url": "https://www.example.com/gp/video/detail/B0XYZ/",
//!   "title": "Fargo",
//!   "season": 1,
//!   "year": 2014,
//!   "dseason": "Minnesota, 2006.",
//!   "network": "FX",
//!   "genre": "Drama",
//!   "episodes": [
//!     { "episode": 1, "title": "The Crocodile's Dilemma",
//!       "depisode": "...", "airdate": "April 15, 2014",
//!       "rating": "TV-MA", "iepisode": "https://..." }
//!   ]
//! }
//! ```
//!
//! Any top-level string besides `url`, `title`, `season`, `year` and
//! `episodes` is reported as a field of the same name; the merge decides
//! which of them apply. Movie pages simply have no `season`.
//!
//! Titles are compared after normalization (case folded, punctuation dropped).
//! A page whose title equals the key's title is an exact match; one where
//! either title contains the other as whole words is a partial match, and
//! partial matches are only offered when no exact page exists. For TV the
//! seasons must also be equal. The episode
//! list of a TV page is the authoritative [`RemoteListing`] for its season.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tapedeck_common::EpisodeNumber;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::metadata::provider::{
    title_confidence, Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId,
    ProviderRecord, RemoteListing,
};

/// One scraped storefront page.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeDocument {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub episodes: Vec<ScrapedEpisode>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// One episode entry on a scraped page.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedEpisode {
    pub episode: u32,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// How closely a page title matches the wanted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TitleMatch {
    Partial,
    Exact,
}

/// Lowercase words joined by single spaces, punctuation dropped.
fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_match(page: &str, wanted: &str) -> Option<TitleMatch> {
    if page.is_empty() || wanted.is_empty() {
        return None;
    }
    if page == wanted {
        return Some(TitleMatch::Exact);
    }
    // Pad so containment only holds on word boundaries.
    let page_words = format!(" {} ", page);
    let wanted_words = format!(" {} ", wanted);
    (page_words.contains(&wanted_words) || wanted_words.contains(&page_words))
        .then_some(TitleMatch::Partial)
}

impl ScrapeDocument {
    fn matches(&self, key: &LookupKey) -> Option<TitleMatch> {
        let (wanted, season_ok) = match key {
            LookupKey::Movie { title, .. } => (title, self.season.is_none()),
            LookupKey::Season { series, season } | LookupKey::Episode { series, season, .. } => {
                (series, self.season == Some(*season))
            }
            LookupKey::File { .. } => return None,
        };
        if !season_ok {
            return None;
        }
        title_match(&normalize_title(&self.title), &normalize_title(wanted))
    }

    fn listing(&self) -> Option<RemoteListing> {
        let page_season = self.season?;
        let episodes: BTreeSet<EpisodeNumber> = self
            .episodes
            .iter()
            .map(|ep| EpisodeNumber::new(ep.season.unwrap_or(page_season), ep.episode))
            .collect();
        Some(RemoteListing {
            url: self.url.clone(),
            episodes,
        })
    }
}

/// Copy string (and numeric) JSON values into a record.
fn copy_fields(record: &mut ProviderRecord, fields: &BTreeMap<String, serde_json::Value>) {
    for (name, value) in fields {
        match value {
            serde_json::Value::String(s) => record.set(name, s.clone()),
            serde_json::Value::Number(n) => record.set(name, n.to_string()),
            _ => {}
        }
    }
}

/// Reads scraped storefront documents from a directory.
pub struct ScrapeIngest {
    dir: PathBuf,
    enabled: bool,
    documents: OnceCell<Vec<(PathBuf, ScrapeDocument)>>,
}

impl ScrapeIngest {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
            documents: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All parseable documents, loaded once and sorted by path.
    async fn documents(&self) -> Result<&[(PathBuf, ScrapeDocument)], ProviderError> {
        let docs = self
            .documents
            .get_or_try_init(|| load_documents(&self.dir))
            .await?;
        Ok(docs.as_slice())
    }

    async fn document(&self, id: &str) -> Result<&ScrapeDocument, ProviderError> {
        self.documents()
            .await?
            .iter()
            .find(|(path, _)| path.to_string_lossy() == id)
            .map(|(_, doc)| doc)
            .ok_or_else(|| ProviderError::malformed(ProviderId::Scrape, format!("unknown document {id}")))
    }
}

async fn load_documents(dir: &Path) -> Result<Vec<(PathBuf, ScrapeDocument)>, ProviderError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ProviderError::unavailable(ProviderId::Scrape, format!("{}: {e}", dir.display())))?;

    let mut docs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ProviderError::unavailable(ProviderId::Scrape, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable scrape document");
                continue;
            }
        };
        match serde_json::from_slice::<ScrapeDocument>(&bytes) {
            Ok(doc) => docs.push((path, doc)),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed scrape document"),
        }
    }

    docs.sort_by(|a, b| a.0.cmp(&b.0));
    debug!(dir = %dir.display(), documents = docs.len(), "Loaded scrape documents");
    Ok(docs)
}

#[async_trait]
impl MetadataProvider for ScrapeIngest {
    fn id(&self) -> ProviderId {
        ProviderId::Scrape
    }

    fn is_available(&self) -> bool {
        self.enabled && self.dir.is_dir()
    }

    fn supports(&self, key: &LookupKey) -> bool {
        !matches!(key, LookupKey::File { .. })
    }

    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
        let Some(wanted) = key.title() else {
            return Ok(Vec::new());
        };
        let wanted_year = match key {
            LookupKey::Movie { year, .. } => *year,
            _ => None,
        };

        let wanted = normalize_title(wanted);
        let mut found: Vec<(TitleMatch, Candidate)> = self
            .documents()
            .await?
            .iter()
            .filter_map(|(path, doc)| {
                let quality = doc.matches(key)?;
                let candidate = Candidate {
                    id: path.to_string_lossy().into_owned(),
                    title: doc.title.clone(),
                    year: doc.year,
                    confidence: title_confidence(
                        &wanted,
                        &normalize_title(&doc.title),
                        wanted_year,
                        doc.year,
                    ),
                };
                Some((quality, candidate))
            })
            .collect();

        if let Some(best) = found.iter().map(|(quality, _)| *quality).max() {
            found.retain(|(quality, _)| *quality == best);
        }
        Ok(found.into_iter().map(|(_, candidate)| candidate).collect())
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError> {
        let doc = self.document(&candidate.id).await?;
        let mut record = ProviderRecord::new(ProviderId::Scrape);

        match key {
            LookupKey::Movie { .. } => {
                copy_fields(&mut record, &doc.fields);
            }
            LookupKey::Season { .. } => {
                copy_fields(&mut record, &doc.fields);
                // Pages without a show rating fall back to the first episode's.
                if record.get("rating").is_none() {
                    if let Some(ep) = doc.episodes.first() {
                        if let Some(serde_json::Value::String(r)) = ep.fields.get("rating") {
                            record.set("rating", r.clone());
                        }
                    }
                }
                record.listing = doc.listing();
            }
            LookupKey::Episode {
                season, episode, ..
            } => {
                let page_season = doc.season.unwrap_or(*season);
                let Some(ep) = doc
                    .episodes
                    .iter()
                    .find(|ep| ep.episode == *episode && ep.season.unwrap_or(page_season) == *season)
                else {
                    return Err(ProviderError::not_found(ProviderId::Scrape, key));
                };
                copy_fields(&mut record, &ep.fields);
            }
            LookupKey::File { .. } => return Err(ProviderError::not_found(ProviderId::Scrape, key)),
        }

        Ok(record)
    }
}
