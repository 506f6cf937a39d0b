//! Per-call policy around a [`MetadataProvider`].
//!
//! [`ProviderClient`] adds a timeout to every call, retries transient
//! failures with exponential backoff, and folds the outcome into a
//! [`Lookup`] so that provider trouble never escapes as an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::provider::{
    best_candidate, Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId,
    ProviderRecord,
};

/// Timeout and retry settings applied to each provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub rate_limit_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            rate_limit_backoff: Duration::from_secs(5),
        }
    }
}

impl CallPolicy {
    /// Wait before retry number `attempt + 1`.
    ///
    /// Rate limiting never waits less than the doubled `rate_limit_backoff`,
    /// whatever `Retry-After` says.
    fn delay_for(&self, error: &ProviderError, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        match error {
            ProviderError::RateLimited { retry_after, .. } => {
                let floor = self.rate_limit_backoff.saturating_mul(factor);
                retry_after.map_or(floor, |after| after.max(floor))
            }
            _ => self.backoff_base.saturating_mul(factor),
        }
    }
}

/// Outcome of one provider lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(ProviderRecord),
    NotFound,
    Failed(ProviderError),
}

impl Lookup {
    pub fn record(&self) -> Option<&ProviderRecord> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<ProviderRecord> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }

    fn from_result(result: Result<ProviderRecord, ProviderError>) -> Self {
        match result {
            Ok(record) => Self::Found(record),
            Err(ProviderError::NotFound { .. }) => Self::NotFound,
            Err(e) => Self::Failed(e),
        }
    }
}

/// A provider wrapped with a [`CallPolicy`].
#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn MetadataProvider>,
    policy: CallPolicy,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn MetadataProvider>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn id(&self) -> ProviderId {
        self.provider.id()
    }

    pub fn supports(&self, key: &LookupKey) -> bool {
        self.provider.supports(key)
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    /// Search and pick the best candidate. `Ok(None)` when nothing matched.
    pub async fn resolve(&self, key: &LookupKey) -> Result<Option<Candidate>, ProviderError> {
        let provider = Arc::clone(&self.provider);
        let result = self
            .call("search", key, || {
                let provider = Arc::clone(&provider);
                let key = key.clone();
                async move { provider.search(&key).await }
            })
            .await;

        match result {
            Ok(candidates) => Ok(best_candidate(&candidates).cloned()),
            Err(ProviderError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch the record for `key` using an already resolved candidate.
    pub async fn fetch(&self, candidate: &Candidate, key: &LookupKey) -> Lookup {
        let provider = Arc::clone(&self.provider);
        let result = self
            .call("fetch", key, || {
                let provider = Arc::clone(&provider);
                let candidate = candidate.clone();
                let key = key.clone();
                async move { provider.fetch(&candidate, &key).await }
            })
            .await;
        self.log_outcome(key, Lookup::from_result(result))
    }

    /// Search, pick the best candidate and fetch its record.
    pub async fn lookup(&self, key: &LookupKey) -> Lookup {
        match self.resolve(key).await {
            Ok(Some(candidate)) => self.fetch(&candidate, key).await,
            Ok(None) => self.log_outcome(key, Lookup::NotFound),
            Err(e) => self.log_outcome(key, Lookup::Failed(e)),
        }
    }

    fn log_outcome(&self, key: &LookupKey, lookup: Lookup) -> Lookup {
        match &lookup {
            Lookup::Found(record) => {
                debug!(provider = %self.id(), key = %key, fields = record.fields.len(), "Provider returned record")
            }
            Lookup::NotFound => debug!(provider = %self.id(), key = %key, "Provider has no match"),
            Lookup::Failed(e) => warn!(provider = %self.id(), key = %key, error = %e, "Provider lookup failed, treating as absent"),
        }
        lookup
    }

    async fn call<T, F, Fut>(&self, op: &str, key: &LookupKey, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.policy.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::unavailable(
                    self.id(),
                    format!("{op} timed out after {:?}", self.policy.timeout),
                )),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(&e, attempt);
                    attempt += 1;
                    warn!(
                        provider = %self.id(),
                        key = %key,
                        op,
                        retry = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times with `error`, then succeeds.
    struct FlakyProvider {
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
        delay: Duration,
    }

    impl FlakyProvider {
        fn new(failures: u32, error: ProviderError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for FlakyProvider {
        fn id(&self) -> ProviderId {
            ProviderId::Tmdb
        }

        fn is_available(&self) -> bool {
            true
        }

        fn supports(&self, _key: &LookupKey) -> bool {
            true
        }

        async fn search(&self, _key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(self.error.clone());
            }
            Ok(vec![
                Candidate {
                    id: "2".into(),
                    title: "Heat".into(),
                    year: Some(1995),
                    confidence: 0.4,
                },
                Candidate {
                    id: "1".into(),
                    title: "Heat".into(),
                    year: Some(1995),
                    confidence: 0.8,
                },
            ])
        }

        async fn fetch(
            &self,
            candidate: &Candidate,
            _key: &LookupKey,
        ) -> Result<ProviderRecord, ProviderError> {
            Ok(ProviderRecord::new(ProviderId::Tmdb).with("tmdb", candidate.id.clone()))
        }
    }

    fn fast_policy() -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(200),
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
            rate_limit_backoff: Duration::from_millis(2),
        }
    }

    fn key() -> LookupKey {
        LookupKey::Movie {
            title: "Heat".into(),
            year: Some(1995),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider = Arc::new(FlakyProvider::new(
            2,
            ProviderError::unavailable(ProviderId::Tmdb, "503"),
        ));
        let client = ProviderClient::new(provider.clone(), fast_policy());

        let lookup = client.lookup(&key()).await;
        assert_eq!(lookup.record().unwrap().get("tmdb"), Some("1"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let provider = Arc::new(FlakyProvider::new(
            10,
            ProviderError::RateLimited {
                provider: ProviderId::Tmdb,
                retry_after: Some(Duration::from_millis(1)),
            },
        ));
        let client = ProviderClient::new(provider.clone(), fast_policy());

        let lookup = client.lookup(&key()).await;
        assert!(matches!(lookup, Lookup::Failed(ProviderError::RateLimited { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_is_not_retried() {
        let provider = Arc::new(FlakyProvider::new(
            1,
            ProviderError::malformed(ProviderId::Tmdb, "bad json"),
        ));
        let client = ProviderClient::new(provider.clone(), fast_policy());

        assert!(matches!(client.lookup(&key()).await, Lookup::Failed(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_maps_to_outcome() {
        let provider = Arc::new(FlakyProvider::new(
            5,
            ProviderError::not_found(ProviderId::Tmdb, &key()),
        ));
        let client = ProviderClient::new(provider.clone(), fast_policy());

        assert!(matches!(client.lookup(&key()).await, Lookup::NotFound));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_becomes_unavailable() {
        let mut provider = FlakyProvider::new(0, ProviderError::unavailable(ProviderId::Tmdb, "x"));
        provider.delay = Duration::from_millis(500);
        let policy = CallPolicy {
            timeout: Duration::from_millis(10),
            max_retries: 0,
            ..fast_policy()
        };
        let client = ProviderClient::new(Arc::new(provider), policy);

        match client.lookup(&key()).await {
            Lookup::Failed(ProviderError::Unavailable { message, .. }) => {
                assert!(message.contains("timed out"))
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn backoff_is_exponential() {
        let policy = fast_policy();
        let e = ProviderError::unavailable(ProviderId::Tmdb, "x");
        assert_eq!(policy.delay_for(&e, 0), Duration::from_millis(1));
        assert_eq!(policy.delay_for(&e, 3), Duration::from_millis(8));
        let rl = ProviderError::RateLimited {
            provider: ProviderId::Tmdb,
            retry_after: None,
        };
        assert_eq!(policy.delay_for(&rl, 1), Duration::from_millis(4));

        let after = |ms| ProviderError::RateLimited {
            provider: ProviderId::Tmdb,
            retry_after: Some(Duration::from_millis(ms)),
        };
        assert_eq!(policy.delay_for(&after(0), 0), Duration::from_millis(2));
        assert_eq!(policy.delay_for(&after(0), 2), Duration::from_millis(8));
        assert_eq!(policy.delay_for(&after(500), 2), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_retry_after_still_backs_off() {
        use crate::metadata::providers::http::ApiClient;
        use crate::metadata::providers::TvmazeProvider;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/shows"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let api = ApiClient::new(ProviderId::Tvmaze, &server.uri(), 50, Duration::from_secs(5)).unwrap();
        let policy = CallPolicy {
            rate_limit_backoff: Duration::from_millis(50),
            ..fast_policy()
        };
        let client = ProviderClient::new(Arc::new(TvmazeProvider::new(api, true)), policy);

        let key = LookupKey::Season {
            series: "Fargo".into(),
            season: 1,
        };
        let started = tokio::time::Instant::now();
        let lookup = client.lookup(&key).await;

        assert!(matches!(
            lookup,
            Lookup::Failed(ProviderError::RateLimited {
                retry_after: Some(after),
                ..
            }) if after.is_zero()
        ));
        // 50ms then 100ms between the three attempts.
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
