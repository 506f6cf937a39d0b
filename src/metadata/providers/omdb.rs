//! OMDb metadata provider (IMDb data, catalog-B).
//!
//! OMDb answers every request with HTTP 200; a miss is signalled by
//! `"Response": "False"` in the body. Absent values come back as `"N/A"`.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{parse_year, present, top_five, urlencoded, ApiClient};
use crate::metadata::provider::{
    title_confidence, Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId,
    ProviderRecord,
};

pub const OMDB_BASE_URL: &str = "https://www.omdbapi.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OmdbSearchResponse {
    #[serde(default)]
    search: Vec<OmdbSearchHit>,
    response: String,
}

#[derive(Debug, Deserialize)]
struct OmdbSearchHit {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OmdbTitle {
    response: String,
    plot: Option<String>,
    released: Option<String>,
    production: Option<String>,
    poster: Option<String>,
    genre: Option<String>,
    rated: Option<String>,
    actors: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
}

/// OMDb provider.
pub struct OmdbProvider {
    api: ApiClient,
    api_key: String,
}

impl OmdbProvider {
    pub fn new(api: ApiClient, api_key: String) -> Self {
        Self { api, api_key }
    }

    fn path(&self, params: &[(&str, &str)]) -> String {
        let mut out = format!("/?apikey={}", urlencoded(&self.api_key));
        for (key, value) in params {
            out.push('&');
            out.push_str(key);
            out.push('=');
            out.push_str(&urlencoded(value));
        }
        out
    }

    async fn title(&self, key: &LookupKey, params: &[(&str, &str)]) -> Result<OmdbTitle, ProviderError> {
        let body: OmdbTitle = self.api.get_json(&self.path(params), None).await?;
        if body.response != "True" {
            return Err(ProviderError::not_found(ProviderId::Omdb, key));
        }
        Ok(body)
    }
}

#[async_trait]
impl MetadataProvider for OmdbProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Omdb
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn supports(&self, key: &LookupKey) -> bool {
        !matches!(key, LookupKey::File { .. })
    }

    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
        let (title, year, kind) = match key {
            LookupKey::Movie { title, year } => (title.as_str(), *year, "movie"),
            LookupKey::Season { series, .. } | LookupKey::Episode { series, .. } => {
                (series.as_str(), None, "series")
            }
            LookupKey::File { .. } => return Ok(Vec::new()),
        };

        let year_str = year.map(|y| y.to_string());
        let mut params = vec![("s", title), ("type", kind)];
        if let Some(ref y) = year_str {
            params.push(("y", y.as_str()));
        }

        let body: OmdbSearchResponse = self.api.get_json(&self.path(&params), None).await?;
        if body.response != "True" {
            return Ok(Vec::new());
        }

        Ok(body
            .search
            .into_iter()
            .map(|hit| {
                let result_year = parse_year(hit.year.as_deref());
                Candidate {
                    confidence: title_confidence(title, &hit.title, year, result_year),
                    id: hit.imdb_id,
                    title: hit.title,
                    year: result_year,
                }
            })
            .collect())
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError> {
        let mut record = ProviderRecord::new(ProviderId::Omdb);
        match key {
            LookupKey::Movie { .. } => {
                let body = self
                    .title(key, &[("i", candidate.id.as_str()), ("plot", "full")])
                    .await?;
                record.set_opt("dmovie", present(body.plot));
                record.set_opt("release", present(body.released));
                record.set_opt("studio", present(body.production));
                record.set_opt("imovie", present(body.poster));
                record.set_opt("genre", present(body.genre));
                record.set_opt("rating", present(body.rated));
                record.set_opt("cast", present(body.actors).and_then(|a| top_five(a.split(','))));
                record.set_opt("imdb", present(body.imdb_id));
            }
            LookupKey::Season { .. } => {
                let body = self
                    .title(key, &[("i", candidate.id.as_str()), ("plot", "full")])
                    .await?;
                record.set_opt("dseries", present(body.plot));
                record.set_opt("iseries", present(body.poster));
                record.set_opt("genre", present(body.genre));
                record.set_opt("rating", present(body.rated));
                record.set_opt("cast", present(body.actors).and_then(|a| top_five(a.split(','))));
                record.set_opt("imdb", present(body.imdb_id));
            }
            LookupKey::Episode {
                season, episode, ..
            } => {
                let season = season.to_string();
                let episode = episode.to_string();
                let body = self
                    .title(
                        key,
                        &[
                            ("i", candidate.id.as_str()),
                            ("Season", season.as_str()),
                            ("Episode", episode.as_str()),
                        ],
                    )
                    .await?;
                record.set_opt("depisode", present(body.plot));
                record.set_opt("airdate", present(body.released));
                record.set_opt("iepisode", present(body.poster));
            }
            LookupKey::File { .. } => return Err(ProviderError::not_found(ProviderId::Omdb, key)),
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OmdbProvider {
        let api = ApiClient::new(ProviderId::Omdb, &server.uri(), 50, Duration::from_secs(5)).unwrap();
        OmdbProvider::new(api, "k".into())
    }

    #[tokio::test]
    async fn search_false_response_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("s", "Nothing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": "False",
                "Error": "Movie not found!"
            })))
            .mount(&server)
            .await;

        let key = LookupKey::Movie {
            title: "Nothing".into(),
            year: None,
        };
        assert!(provider(&server).search(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_movie_skips_placeholders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("i", "tt0113277"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": "True",
                "Plot": "A group of high-end professional thieves...",
                "Released": "15 Dec 1995",
                "Production": "N/A",
                "Poster": "https://m.media-amazon.com/images/heat.jpg",
                "Genre": "Action, Crime, Drama",
                "Rated": "R",
                "Actors": "Al Pacino, Robert De Niro, Val Kilmer",
                "imdbID": "tt0113277"
            })))
            .mount(&server)
            .await;

        let candidate = Candidate {
            id: "tt0113277".into(),
            title: "Heat".into(),
            year: Some(1995),
            confidence: 0.8,
        };
        let key = LookupKey::Movie {
            title: "Heat".into(),
            year: Some(1995),
        };
        let record = provider(&server).fetch(&candidate, &key).await.unwrap();
        assert_eq!(record.get("studio"), None);
        assert_eq!(record.get("rating"), Some("R"));
        assert_eq!(record.get("cast"), Some("Al Pacino, Robert De Niro, Val Kilmer"));
        assert_eq!(record.get("imdb"), Some("tt0113277"));
    }

    #[tokio::test]
    async fn fetch_episode_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Episode", "99"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": "False",
                "Error": "Series or episode not found!"
            })))
            .mount(&server)
            .await;

        let candidate = Candidate {
            id: "tt2802850".into(),
            title: "Fargo".into(),
            year: None,
            confidence: 0.5,
        };
        let key = LookupKey::Episode {
            series: "Fargo".into(),
            season: 1,
            episode: 99,
        };
        let err = provider(&server).fetch(&candidate, &key).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }
}
