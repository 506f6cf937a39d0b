//! TVmaze metadata provider (catalog-D).
//!
//! TVmaze needs no API key and only knows about TV shows. Summaries come back
//! as HTML and are stripped to plain text.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{parse_year, strip_html, top_five, urlencoded, ApiClient};
use crate::metadata::provider::{
    title_confidence, Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId,
    ProviderRecord,
};

pub const TVMAZE_BASE_URL: &str = "https://api.tvmaze.com";

#[derive(Debug, Deserialize)]
struct SearchHit {
    show: ShowSummary,
}

#[derive(Debug, Deserialize)]
struct ShowSummary {
    id: u64,
    name: String,
    premiered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Image {
    original: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Externals {
    imdb: Option<String>,
    thetvdb: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CastCredit {
    person: Named,
}

#[derive(Debug, Default, Deserialize)]
struct Embedded {
    #[serde(default)]
    cast: Vec<CastCredit>,
}

#[derive(Debug, Deserialize)]
struct Show {
    id: u64,
    summary: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    network: Option<Named>,
    #[serde(rename = "webChannel")]
    web_channel: Option<Named>,
    image: Option<Image>,
    #[serde(default)]
    externals: Externals,
    #[serde(rename = "_embedded", default)]
    embedded: Embedded,
}

#[derive(Debug, Deserialize)]
struct Season {
    number: Option<u32>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Episode {
    summary: Option<String>,
    airdate: Option<String>,
    image: Option<Image>,
}

/// TVmaze provider.
pub struct TvmazeProvider {
    api: ApiClient,
    enabled: bool,
}

impl TvmazeProvider {
    pub fn new(api: ApiClient, enabled: bool) -> Self {
        Self { api, enabled }
    }

    async fn fetch_show(&self, id: &str, season: u32) -> Result<ProviderRecord, ProviderError> {
        let show: Show = self.api.get_json(&format!("/shows/{id}?embed=cast"), None).await?;

        let mut record = ProviderRecord::new(ProviderId::Tvmaze);
        record.set("tvmaze", show.id.to_string());
        record.set_opt("dseries", show.summary.as_deref().map(strip_html));
        record.set_opt("genre", (!show.genres.is_empty()).then(|| show.genres.join(", ")));
        record.set_opt("network", show.network.or(show.web_channel).map(|n| n.name));
        record.set_opt("iseries", show.image.and_then(|i| i.original));
        record.set_opt("imdb", show.externals.imdb);
        record.set_opt("tvdb", show.externals.thetvdb.map(|id| id.to_string()));
        record.set_opt("cast", top_five(show.embedded.cast.iter().map(|c| &c.person.name)));

        let seasons: Vec<Season> = match self.api.get_json(&format!("/shows/{id}/seasons"), None).await {
            Ok(seasons) => seasons,
            Err(ProviderError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        record.set_opt(
            "dseason",
            seasons
                .into_iter()
                .find(|s| s.number == Some(season))
                .and_then(|s| s.summary)
                .map(|s| strip_html(&s)),
        );

        Ok(record)
    }
}

#[async_trait]
impl MetadataProvider for TvmazeProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Tvmaze
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    fn supports(&self, key: &LookupKey) -> bool {
        matches!(key, LookupKey::Season { .. } | LookupKey::Episode { .. })
    }

    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
        let Some(series) = key.title().filter(|_| self.supports(key)) else {
            return Ok(Vec::new());
        };

        let hits: Vec<SearchHit> = self
            .api
            .get_json(&format!("/search/shows?q={}", urlencoded(series)), None)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let year = parse_year(hit.show.premiered.as_deref());
                Candidate {
                    id: hit.show.id.to_string(),
                    confidence: title_confidence(series, &hit.show.name, None, year),
                    title: hit.show.name,
                    year,
                }
            })
            .collect())
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError> {
        match key {
            LookupKey::Season { season, .. } => self.fetch_show(&candidate.id, *season).await,
            LookupKey::Episode {
                season, episode, ..
            } => {
                let ep: Episode = self
                    .api
                    .get_json(
                        &format!(
                            "/shows/{}/episodebynumber?season={season}&number={episode}",
                            candidate.id
                        ),
                        None,
                    )
                    .await?;
                let mut record = ProviderRecord::new(ProviderId::Tvmaze);
                record.set_opt("depisode", ep.summary.as_deref().map(strip_html));
                record.set_opt("airdate", ep.airdate);
                record.set_opt("iepisode", ep.image.and_then(|i| i.original));
                Ok(record)
            }
            _ => Err(ProviderError::not_found(ProviderId::Tvmaze, key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> TvmazeProvider {
        let api = ApiClient::new(ProviderId::Tvmaze, &server.uri(), 50, Duration::from_secs(5)).unwrap();
        TvmazeProvider::new(api, true)
    }

    #[tokio::test]
    async fn movies_are_not_supported() {
        let server = MockServer::start().await;
        let key = LookupKey::Movie {
            title: "Heat".into(),
            year: None,
        };
        let p = provider(&server);
        assert!(!p.supports(&key));
        assert!(p.search(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_show_strips_html_and_picks_season() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shows/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "summary": "<p><b>Fargo</b> is an anthology.</p>",
                "genres": ["Drama", "Crime"],
                "network": null,
                "webChannel": {"name": "Hulu"},
                "image": {"original": "https://static.tvmaze.com/fargo.jpg"},
                "externals": {"imdb": "tt2802850", "thetvdb": 269613},
                "_embedded": {"cast": [{"person": {"name": "Billy Bob Thornton"}}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/shows/1/seasons"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"number": 1, "summary": "<p>Minnesota, 2006.</p>"},
                {"number": 2, "summary": "<p>Sioux Falls, 1979.</p>"}
            ])))
            .mount(&server)
            .await;

        let candidate = Candidate {
            id: "1".into(),
            title: "Fargo".into(),
            year: Some(2014),
            confidence: 0.5,
        };
        let key = LookupKey::Season {
            series: "Fargo".into(),
            season: 2,
        };
        let record = provider(&server).fetch(&candidate, &key).await.unwrap();
        assert_eq!(record.get("dseries"), Some("Fargo is an anthology."));
        assert_eq!(record.get("dseason"), Some("Sioux Falls, 1979."));
        assert_eq!(record.get("network"), Some("Hulu"));
        assert_eq!(record.get("genre"), Some("Drama, Crime"));
        assert_eq!(record.get("tvdb"), Some("269613"));
        assert_eq!(record.get("tvmaze"), Some("1"));
    }

    #[tokio::test]
    async fn fetch_episode_by_number() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shows/1/episodebynumber"))
            .and(query_param("season", "1"))
            .and(query_param("number", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "summary": "<p>Lorne takes a job.</p>",
                "airdate": "2014-04-29",
                "image": null
            })))
            .mount(&server)
            .await;

        let candidate = Candidate {
            id: "1".into(),
            title: "Fargo".into(),
            year: None,
            confidence: 0.5,
        };
        let key = LookupKey::Episode {
            series: "Fargo".into(),
            season: 1,
            episode: 3,
        };
        let record = provider(&server).fetch(&candidate, &key).await.unwrap();
        assert_eq!(record.get("depisode"), Some("Lorne takes a job."));
        assert_eq!(record.get("airdate"), Some("2014-04-29"));
        assert_eq!(record.get("iepisode"), None);
    }
}
