//! TMDB (The Movie Database) metadata provider.
//!
//! Implements [`MetadataProvider`] by querying the TMDB v3 REST API.
//!
//! Features:
//! - Movie and TV search with confidence scoring based on title similarity
//!   and year proximity.
//! - Movie, season and episode records, with credits and external ids
//!   appended to the detail request.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{parse_year, top_five, urlencoded, ApiClient};
use crate::metadata::provider::{
    title_confidence, Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId,
    ProviderRecord,
};

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieSearchResult {
    id: u64,
    title: Option<String>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvSearchResult {
    id: u64,
    name: Option<String>,
    first_air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbNamed {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbCredits {
    #[serde(default)]
    cast: Vec<TmdbNamed>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieDetail {
    id: u64,
    overview: Option<String>,
    release_date: Option<String>,
    poster_path: Option<String>,
    imdb_id: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbNamed>,
    #[serde(default)]
    production_companies: Vec<TmdbNamed>,
    #[serde(default)]
    credits: TmdbCredits,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbExternalIds {
    imdb_id: Option<String>,
    tvdb_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvDetail {
    id: u64,
    overview: Option<String>,
    poster_path: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbNamed>,
    #[serde(default)]
    networks: Vec<TmdbNamed>,
    #[serde(default)]
    credits: TmdbCredits,
    #[serde(default)]
    external_ids: TmdbExternalIds,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetail {
    overview: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisodeDetail {
    overview: Option<String>,
    air_date: Option<String>,
    still_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// TMDB metadata provider (catalog-A).
pub struct TmdbProvider {
    api: ApiClient,
    api_key: String,
    language: String,
}

impl TmdbProvider {
    /// Create a new TMDB provider.
    ///
    /// The `language` parameter should be a language tag such as `"en-US"`.
    pub fn new(api: ApiClient, api_key: String, language: String) -> Self {
        Self {
            api,
            api_key,
            language,
        }
    }

    /// Build an API path with the API key and language query parameters.
    fn path(&self, path: &str, extra_params: &[(&str, &str)]) -> String {
        let mut out = format!(
            "{path}?api_key={}&language={}",
            urlencoded(&self.api_key),
            urlencoded(&self.language)
        );
        for (key, value) in extra_params {
            out.push('&');
            out.push_str(key);
            out.push('=');
            out.push_str(&urlencoded(value));
        }
        out
    }

    async fn fetch_movie(&self, id: &str) -> Result<ProviderRecord, ProviderError> {
        let detail: TmdbMovieDetail = self
            .api
            .get_json(
                &self.path(&format!("/movie/{id}"), &[("append_to_response", "credits")]),
                None,
            )
            .await?;

        let mut record = ProviderRecord::new(ProviderId::Tmdb);
        record.set("tmdb", detail.id.to_string());
        record.set_opt("dmovie", detail.overview);
        record.set_opt("release", detail.release_date);
        record.set_opt("imdb", detail.imdb_id);
        record.set_opt("imovie", detail.poster_path.map(|p| image_url(&p)));
        record.set_opt("studio", detail.production_companies.into_iter().next().map(|c| c.name));
        record.set_opt("genre", join_names(&detail.genres));
        record.set_opt("cast", top_five(detail.credits.cast.iter().map(|c| &c.name)));
        Ok(record)
    }

    async fn fetch_season(&self, id: &str, season: u32) -> Result<ProviderRecord, ProviderError> {
        let detail: TmdbTvDetail = self
            .api
            .get_json(
                &self.path(
                    &format!("/tv/{id}"),
                    &[("append_to_response", "credits,external_ids")],
                ),
                None,
            )
            .await?;

        let mut record = ProviderRecord::new(ProviderId::Tmdb);
        record.set("tmdb", detail.id.to_string());
        record.set_opt("dseries", detail.overview);
        record.set_opt("iseries", detail.poster_path.map(|p| image_url(&p)));
        record.set_opt("network", detail.networks.into_iter().next().map(|n| n.name));
        record.set_opt("genre", join_names(&detail.genres));
        record.set_opt("cast", top_five(detail.credits.cast.iter().map(|c| &c.name)));
        record.set_opt("imdb", detail.external_ids.imdb_id);
        record.set_opt("tvdb", detail.external_ids.tvdb_id.map(|id| id.to_string()));

        // The season endpoint is optional: a missing season keeps the show data.
        match self
            .api
            .get_json::<TmdbSeasonDetail>(&self.path(&format!("/tv/{id}/season/{season}"), &[]), None)
            .await
        {
            Ok(season) => record.set_opt("dseason", season.overview),
            Err(ProviderError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        Ok(record)
    }

    async fn fetch_episode(
        &self,
        id: &str,
        season: u32,
        episode: u32,
    ) -> Result<ProviderRecord, ProviderError> {
        let detail: TmdbEpisodeDetail = self
            .api
            .get_json(
                &self.path(&format!("/tv/{id}/season/{season}/episode/{episode}"), &[]),
                None,
            )
            .await?;

        let mut record = ProviderRecord::new(ProviderId::Tmdb);
        record.set_opt("depisode", detail.overview);
        record.set_opt("airdate", detail.air_date);
        record.set_opt("iepisode", detail.still_path.map(|p| image_url(&p)));
        Ok(record)
    }
}

/// Convert a TMDB image path fragment to a full URL.
fn image_url(path: &str) -> String {
    format!("{TMDB_IMAGE_BASE}{path}")
}

fn join_names(items: &[TmdbNamed]) -> Option<String> {
    let names: Vec<&str> = items.iter().map(|g| g.name.as_str()).collect();
    (!names.is_empty()).then(|| names.join(", "))
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Tmdb
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn supports(&self, key: &LookupKey) -> bool {
        !matches!(key, LookupKey::File { .. })
    }

    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
        match key {
            LookupKey::Movie { title, year } => {
                let year_str = year.map(|y| y.to_string());
                let mut params = vec![("query", title.as_str())];
                if let Some(ref y) = year_str {
                    params.push(("year", y.as_str()));
                }
                let body: TmdbSearchResponse<TmdbMovieSearchResult> =
                    self.api.get_json(&self.path("/search/movie", &params), None).await?;

                Ok(body
                    .results
                    .into_iter()
                    .map(|r| {
                        let result_title = r.title.unwrap_or_default();
                        let result_year = parse_year(r.release_date.as_deref());
                        Candidate {
                            id: r.id.to_string(),
                            confidence: title_confidence(title, &result_title, *year, result_year),
                            title: result_title,
                            year: result_year,
                        }
                    })
                    .collect())
            }
            LookupKey::Season { series, .. } | LookupKey::Episode { series, .. } => {
                let body: TmdbSearchResponse<TmdbTvSearchResult> = self
                    .api
                    .get_json(&self.path("/search/tv", &[("query", series.as_str())]), None)
                    .await?;

                Ok(body
                    .results
                    .into_iter()
                    .map(|r| {
                        let result_title = r.name.unwrap_or_default();
                        let result_year = parse_year(r.first_air_date.as_deref());
                        Candidate {
                            id: r.id.to_string(),
                            confidence: title_confidence(series, &result_title, None, result_year),
                            title: result_title,
                            year: result_year,
                        }
                    })
                    .collect())
            }
            LookupKey::File { .. } => Ok(Vec::new()),
        }
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError> {
        match key {
            LookupKey::Movie { .. } => self.fetch_movie(&candidate.id).await,
            LookupKey::Season { season, .. } => self.fetch_season(&candidate.id, *season).await,
            LookupKey::Episode {
                season, episode, ..
            } => self.fetch_episode(&candidate.id, *season, *episode).await,
            LookupKey::File { .. } => Err(ProviderError::not_found(ProviderId::Tmdb, key)),
        }
    }
}
