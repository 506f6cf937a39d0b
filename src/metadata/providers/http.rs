//! Shared HTTP plumbing for the catalog providers.
//!
//! [`ApiClient`] owns the reqwest client and a token-bucket limiter, and turns
//! HTTP outcomes into [`ProviderError`]s:
//!
//! | outcome              | error                              |
//! |----------------------|------------------------------------|
//! | 404                  | `NotFound`                         |
//! | 429                  | `RateLimited` (with `Retry-After`) |
//! | 5xx, 401, transport  | `Unavailable`                      |
//! | undecodable body     | `Malformed`                        |
//!
//! Retrying is left to [`ProviderClient`](crate::metadata::client::ProviderClient).

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::metadata::provider::{ProviderError, ProviderId};

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Rate-limited JSON client bound to one provider's base URL.
pub struct ApiClient {
    provider: ProviderId,
    client: reqwest::Client,
    base_url: String,
    rate_limiter: DirectLimiter,
}

impl ApiClient {
    /// Build a client allowing `requests_per_second` requests (at least one).
    pub fn new(
        provider: ProviderId,
        base_url: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tapedeck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            provider,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET `path` (relative to the base URL) and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<T, ProviderError> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        self.send(path, request).await
    }

    /// POST a JSON body to `path` and decode the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(path, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        self.rate_limiter.until_ready().await;
        debug!(provider = %self.provider, path, "Catalog request");

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(self.provider, e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                provider: self.provider,
                key: path.to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited {
                provider: self.provider,
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(ProviderError::unavailable(
                self.provider,
                format!("HTTP {status} for {path}"),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::unavailable(self.provider, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::malformed(self.provider, e))
    }
}

/// Minimal percent-encoding for query parameter values.
pub fn urlencoded(s: &str) -> String {
    const HEX: [u8; 16] = *b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

/// Extract a four-digit year from a date string like `"2023-04-15"`.
pub fn parse_year(date: Option<&str>) -> Option<u16> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse::<u16>().ok())
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex should compile"));

/// Remove markup from an HTML summary.
pub fn strip_html(s: &str) -> String {
    HTML_TAG.replace_all(s, "").trim().to_string()
}

/// Keep the first five names of a comma separated list.
pub fn top_five(names: impl IntoIterator<Item = impl AsRef<str>>) -> Option<String> {
    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .take(5)
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

/// Treat OMDb style `"N/A"` placeholders and blanks as missing.
pub fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && v != "N/A")
}
