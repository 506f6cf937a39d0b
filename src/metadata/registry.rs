//! Provider registry for managing multiple [`MetadataProvider`] implementations.
//!
//! The [`ProviderRegistry`] holds every configured metadata source in
//! registration order. The orchestrator asks it for the available providers;
//! at startup it is checked against the [`FieldPolicy`] so that priority
//! tables naming an unregistered source are reported.

use std::sync::Arc;

use tracing::warn;

use super::fields::FieldPolicy;
use super::provider::{MetadataProvider, ProviderId};

/// A registry that manages multiple [`MetadataProvider`] implementations.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use tapedeck::metadata::registry::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// registry.register(Arc::new(my_provider));
/// assert!(registry.get(ProviderId::Tmdb).is_some());
/// ```
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry with no providers.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Register a new metadata provider.
    ///
    /// Registering a second provider with the same id replaces the first,
    /// keeping its position.
    pub fn register(&mut self, provider: Arc<dyn MetadataProvider>) {
        match self.providers.iter().position(|p| p.id() == provider.id()) {
            Some(idx) => self.providers[idx] = provider,
            None => self.providers.push(provider),
        }
    }

    /// Providers that are currently available, in registration order.
    pub fn available(&self) -> Vec<Arc<dyn MetadataProvider>> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .cloned()
            .collect()
    }

    /// Look up a provider by id, available or not.
    pub fn get(&self, id: ProviderId) -> Option<&dyn MetadataProvider> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .map(|p| p.as_ref())
    }

    /// Ids of every registered provider.
    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers named by the policy that are not registered.
    ///
    /// Each one is logged at `warn`; fields ranked on them simply fall through
    /// to the next source.
    pub fn check_policy(&self, policy: &FieldPolicy) -> Vec<ProviderId> {
        let missing: Vec<ProviderId> = policy
            .providers()
            .filter(|id| self.get(*id).is_none())
            .collect();
        for id in &missing {
            warn!(provider = %id, "Priority tables name a provider that is not registered");
        }
        missing
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::provider::{Candidate, LookupKey, ProviderError, ProviderRecord};
    use async_trait::async_trait;

    /// A minimal stub provider used for testing.
    struct StubProvider {
        id: ProviderId,
        available: bool,
    }

    #[async_trait]
    impl MetadataProvider for StubProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn supports(&self, _key: &LookupKey) -> bool {
            true
        }

        async fn search(&self, _key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch(
            &self,
            _candidate: &Candidate,
            key: &LookupKey,
        ) -> Result<ProviderRecord, ProviderError> {
            Err(ProviderError::not_found(self.id, key))
        }
    }

    fn stub(id: ProviderId, available: bool) -> Arc<dyn MetadataProvider> {
        Arc::new(StubProvider { id, available })
    }

    #[test]
    fn empty_registry() {
        let registry = ProviderRegistry::new();
        assert!(registry.available().is_empty());
        assert!(registry.get(ProviderId::Tmdb).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(ProviderId::Tmdb, true));
        registry.register(stub(ProviderId::Omdb, false));

        assert_eq!(registry.available().len(), 1);
        assert!(registry.get(ProviderId::Tmdb).is_some());
        assert!(registry.get(ProviderId::Omdb).is_some()); // registered but not available
        assert!(registry.get(ProviderId::Tvdb).is_none());
    }

    #[test]
    fn re_register_replaces_in_place() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(ProviderId::Scrape, false));
        registry.register(stub(ProviderId::Tmdb, true));
        registry.register(stub(ProviderId::Scrape, true));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![ProviderId::Scrape, ProviderId::Tmdb]);
        assert_eq!(registry.available().len(), 2);
    }

    #[test]
    fn check_policy_reports_unregistered() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(ProviderId::Scrape, true));
        registry.register(stub(ProviderId::Probe, true));
        registry.register(stub(ProviderId::Tmdb, true));
        registry.register(stub(ProviderId::Omdb, true));

        let missing = registry.check_policy(&FieldPolicy::default());
        assert_eq!(missing, vec![ProviderId::Tvdb, ProviderId::Tvmaze]);
    }
}
