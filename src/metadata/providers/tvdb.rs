//! TheTVDB v4 metadata provider (catalog-C).
//!
//! Every request carries a bearer token obtained from `POST /login`. The
//! token is cached for the life of the provider; a 401 drops it and the call
//! fails as `Unavailable`, so the retry logs in again.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::http::{parse_year, urlencoded, ApiClient};
use crate::metadata::provider::{
    title_confidence, Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId,
    ProviderRecord,
};

pub const TVDB_BASE_URL: &str = "https://api4.thetvdb.com/v4";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    tvdb_id: String,
    name: String,
    year: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteId {
    id: String,
    source_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesExtended {
    id: u64,
    overview: Option<String>,
    image: Option<String>,
    #[serde(default)]
    genres: Vec<Named>,
    original_network: Option<Named>,
    latest_network: Option<Named>,
    #[serde(default)]
    remote_ids: Vec<RemoteId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieExtended {
    id: u64,
    image: Option<String>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    studios: Vec<Named>,
    #[serde(default)]
    remote_ids: Vec<RemoteId>,
}

#[derive(Debug, Deserialize)]
struct EpisodePage {
    #[serde(default)]
    episodes: Vec<Episode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Episode {
    overview: Option<String>,
    aired: Option<String>,
    image: Option<String>,
}

fn imdb_of(ids: &[RemoteId]) -> Option<String> {
    ids.iter()
        .find(|r| r.source_name.eq_ignore_ascii_case("imdb"))
        .map(|r| r.id.clone())
}

fn join_names(items: &[Named]) -> Option<String> {
    let names: Vec<&str> = items.iter().map(|n| n.name.as_str()).collect();
    (!names.is_empty()).then(|| names.join(", "))
}

/// TheTVDB provider.
pub struct TvdbProvider {
    api: ApiClient,
    api_key: String,
    token: Mutex<Option<String>>,
}

impl TvdbProvider {
    pub fn new(api: ApiClient, api_key: String) -> Self {
        Self {
            api,
            api_key,
            token: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let login: Envelope<LoginData> = self
            .api
            .post_json("/login", &serde_json::json!({ "apikey": self.api_key }))
            .await?;
        debug!("Obtained TheTVDB bearer token");
        *guard = Some(login.data.token.clone());
        Ok(login.data.token)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let token = self.token().await?;
        let result = self.api.get_json::<Envelope<T>>(path, Some(&token)).await;
        if let Err(ProviderError::Unavailable { message, .. }) = &result {
            if message.contains("401") {
                *self.token.lock().await = None;
            }
        }
        result.map(|envelope| envelope.data)
    }
}

#[async_trait]
impl MetadataProvider for TvdbProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Tvdb
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

        let hits: Vec<SearchHit> = self
            .get(&format!("/search?query={}&type={kind}", urlencoded(title)))
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let result_year = parse_year(hit.year.as_deref());
                Candidate {
                    confidence: title_confidence(title, &hit.name, year, result_year),
                    id: hit.tvdb_id,
                    title: hit.name,
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
        let mut record = ProviderRecord::new(ProviderId::Tvdb);
        match key {
            LookupKey::Movie { .. } => {
                let movie: MovieExtended = self
                    .get(&format!("/movies/{}/extended?short=true", candidate.id))
                    .await?;
                record.set_opt("imovie", movie.image);
                record.set_opt("genre", join_names(&movie.genres));
                record.set_opt("studio", movie.studios.into_iter().next().map(|s| s.name));
                record.set_opt("imdb", imdb_of(&movie.remote_ids));
                record.set("tvdb", movie.id.to_string());
            }
            LookupKey::Season { .. } => {
                let series: SeriesExtended = self
                    .get(&format!("/series/{}/extended?short=true", candidate.id))
                    .await?;
                record.set("tvdb", series.id.to_string());
                record.set_opt("dseries", series.overview);
                record.set_opt("iseries", series.image);
                record.set_opt("genre", join_names(&series.genres));
                record.set_opt(
                    "network",
                    series.original_network.or(series.latest_network).map(|n| n.name),
                );
                record.set_opt("imdb", imdb_of(&series.remote_ids));
            }
            LookupKey::Episode {
                season, episode, ..
            } => {
                let page: EpisodePage = self
                    .get(&format!(
                        "/series/{}/episodes/official?season={season}&episodeNumber={episode}",
                        candidate.id
                    ))
                    .await?;
                let Some(ep) = page.episodes.into_iter().next() else {
                    return Err(ProviderError::not_found(ProviderId::Tvdb, key));
                };
                record.set_opt("depisode", ep.overview);
                record.set_opt("airdate", ep.aired);
                record.set_opt("iepisode", ep.image);
            }
            LookupKey::File { .. } => return Err(ProviderError::not_found(ProviderId::Tvdb, key)),
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(serde_json::json!({"apikey": "secret"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"token": "tok"}})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer) -> TvdbProvider {
        let api = ApiClient::new(ProviderId::Tvdb, &server.uri(), 50, Duration::from_secs(5)).unwrap();
        TvdbProvider::new(api, "secret".into())
    }

    #[tokio::test]
    async fn logs_in_once_and_searches() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("type", "series"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"tvdb_id": "269613", "name": "Fargo", "year": "2014"}]
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        let key = LookupKey::Season {
            series: "Fargo".into(),
            season: 1,
        };
        let first = p.search(&key).await.unwrap();
        let second = p.search(&key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].id, "269613");
        assert_eq!(first[0].year, Some(2014));
    }

    #[tokio::test]
    async fn fetch_series_maps_fields() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/series/269613/extended"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "id": 269613,
                    "overview": "Anthology crime drama.",
                    "image": "https://artworks.thetvdb.com/fargo.jpg",
                    "genres": [{"name": "Crime"}, {"name": "Drama"}],
                    "originalNetwork": {"name": "FX"},
                    "remoteIds": [{"id": "tt2802850", "sourceName": "IMDB"}]
                }
            })))
            .mount(&server)
            .await;

        let candidate = Candidate {
            id: "269613".into(),
            title: "Fargo".into(),
            year: Some(2014),
            confidence: 0.5,
        };
        let key = LookupKey::Season {
            series: "Fargo".into(),
            season: 1,
        };
        let record = provider(&server).fetch(&candidate, &key).await.unwrap();
        assert_eq!(record.get("tvdb"), Some("269613"));
        assert_eq!(record.get("network"), Some("FX"));
        assert_eq!(record.get("genre"), Some("Crime, Drama"));
        assert_eq!(record.get("imdb"), Some("tt2802850"));
    }

    #[tokio::test]
    async fn missing_episode_is_not_found() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/series/269613/episodes/official"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": {"episodes": []}})),
            )
            .mount(&server)
            .await;

        let candidate = Candidate {
            id: "269613".into(),
            title: "Fargo".into(),
            year: None,
            confidence: 0.5,
        };
        let key = LookupKey::Episode {
            series: "Fargo".into(),
            season: 1,
            episode: 40,
        };
        let err = provider(&server).fetch(&candidate, &key).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }
}
