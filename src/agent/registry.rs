use super::discovery::{Discovery, ExactDiscovery};
use super::types::{AgentCard, DirectoryRecord};
use crate::error::{Error, Result};
use crate::helpers::normalize_url;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Entries {
    /// Append-only, in registration order.
    records: Vec<DirectoryRecord>,
    by_endpoint: HashMap<String, usize>,
    /// Endpoints claimed by a registration that is still indexing.
    pending: HashSet<String>,
}

/// Directory of registered agents keyed by endpoint.
///
/// Registration is insert-if-absent: a second registration for the same endpoint
/// is a conflict. Writers are serialized, readers share the lock. Indexing into the
/// discovery backend happens while the endpoint is claimed but not yet visible, so
/// a card is never listed without being searchable.
#[derive(Clone)]
pub struct AgentRegistry {
    entries: Arc<RwLock<Entries>>,
    discovery: Arc<dyn Discovery>,
}

impl AgentRegistry {
    pub fn new() -> Self { Self::with_discovery(Arc::new(ExactDiscovery)) }

    pub fn with_discovery(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            discovery,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> { self.entries.read().unwrap_or_else(PoisonError::into_inner) }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> { self.entries.write().unwrap_or_else(PoisonError::into_inner) }

    pub fn discovery(&self) -> &'static str { self.discovery.name() }

    pub async fn register(&self, card: AgentCard, owner: Option<String>) -> Result<()> {
        card.validate()?;
        let mut reservation = self.reserve(&card)?;

        if let Err(err) = self.discovery.index(&card).await {
            log::error!("registration of {} rolled back: {err}", reservation.key);
            return Err(err);
        }

        let mut entries = self.write();
        let key = reservation.commit(&mut entries);

        let position = entries.records.len();
        let record = DirectoryRecord::new(card, owner);
        log::info!("registered agent at {key} for {} at {}", record.owner.as_deref().unwrap_or("unknown owner"), record.registered_at);

        entries.records.push(record);
        entries.by_endpoint.insert(key, position);
        Ok(())
    }

    /// Claim the card's endpoint until the registration commits or is dropped.
    fn reserve(&self, card: &AgentCard) -> Result<Reservation<'_>> {
        let key = card.key();
        let mut entries = self.write();

        if entries.by_endpoint.contains_key(&key) || !entries.pending.insert(key.clone()) {
            return Err(Error::Conflict(card.endpoint.clone()));
        }

        Ok(Reservation {
            registry: self,
            key,
            committed: false,
        })
    }

    /// Registered cards in registration order.
    pub fn list(&self) -> Vec<AgentCard> { self.read().records.iter().map(|record| record.card.clone()).collect() }

    pub fn get(&self, endpoint: &str) -> Result<AgentCard> {
        let entries = self.read();
        entries
            .by_endpoint
            .get(&normalize_url(endpoint))
            .map(|&position| entries.records[position].card.clone())
            .ok_or_else(|| Error::NotFound(endpoint.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn owner(&self, endpoint: &str) -> Option<String> {
        let entries = self.read();
        let position = *entries.by_endpoint.get(&normalize_url(endpoint))?;
        entries.records[position].owner.clone()
    }

    /// Up to `k` cards ranked against `text` by the configured discovery backend.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<AgentCard>> {
        let catalog = self.list();
        let keys = self.discovery.query(text, k, &catalog).await?;

        let by_key = catalog.into_iter().map(|card| (card.key(), card)).collect::<HashMap<_, _>>();
        Ok(keys.iter().filter_map(|key| by_key.get(key).cloned()).take(k).collect())
    }

    pub fn len(&self) -> usize { self.read().records.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Pending claim on an endpoint. Released on drop unless committed, so a
/// registration abandoned mid-index leaves the endpoint free.
struct Reservation<'r> {
    registry: &'r AgentRegistry,
    key: String,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(&mut self, entries: &mut Entries) -> String {
        entries.pending.remove(&self.key);
        self.committed = true;
        self.key.clone()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.write().pending.remove(&self.key);
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::discovery::{HashingEmbedder, SemanticDiscovery};
    use crate::agent::types::fixtures::card;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn semantic() -> AgentRegistry { AgentRegistry::with_discovery(Arc::new(SemanticDiscovery::new(Arc::new(HashingEmbedder::new(256))))) }

    struct FailingIndex {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Discovery for FailingIndex {
        fn name(&self) -> &'static str { "failing" }

        async fn index(&self, _card: &AgentCard) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Index("backend unavailable".to_string()))
        }

        async fn query(&self, _text: &str, _k: usize, _catalog: &[AgentCard]) -> Result<Vec<String>> { Ok(Vec::new()) }
    }

    #[tokio::test]
    async fn duplicate_endpoint_is_a_conflict() {
        let registry = AgentRegistry::new();
        registry.register(card("Echo", "http://echo.local", &[]), None).await.unwrap();

        let second = registry.register(card("Echo Two", "http://echo.local/", &[]), None).await;
        assert!(matches!(second, Err(Error::Conflict(_))));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("http://echo.local").unwrap().name, "Echo");
    }

    #[tokio::test]
    async fn list_keeps_registration_order_without_duplicates() {
        let registry = AgentRegistry::new();
        let endpoints = ["http://c.local", "http://a.local", "http://b.local"];

        for endpoint in endpoints {
            registry.register(card(endpoint, endpoint, &[]), None).await.unwrap();
        }
        let _ = registry.register(card("dup", "http://a.local", &[]), None).await;

        let listed = registry.list().into_iter().map(|card| card.endpoint).collect::<Vec<_>>();
        assert_eq!(listed, endpoints);
    }

    #[tokio::test]
    async fn get_round_trips_and_reports_missing() {
        let registry = AgentRegistry::new();
        let entry = card("Weather", "http://weather.local/", &["Forecast", "Alerts"]);
        registry.register(entry.clone(), Some("ops@trusted.com".to_string())).await.unwrap();

        assert_eq!(registry.get(&entry.endpoint).unwrap(), entry);
        assert_eq!(registry.owner(&entry.endpoint).as_deref(), Some("ops@trusted.com"));
        assert!(matches!(registry.get("http://missing.local"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_cards_are_rejected_without_side_effects() {
        let registry = AgentRegistry::new();
        let mut bad = card("Bad", "http://bad.local", &[]);
        bad.url = "mailto:someone".to_string();

        assert!(matches!(registry.register(bad, None).await, Err(Error::Invalid(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn index_failure_rolls_back_registration() {
        let failing = Arc::new(FailingIndex { calls: AtomicUsize::new(0) });
        let registry = AgentRegistry::with_discovery(failing.clone());

        let result = registry.register(card("Echo", "http://echo.local", &[]), None).await;
        assert!(matches!(result, Err(Error::Index(_))));
        assert!(registry.list().is_empty());
        assert!(matches!(registry.get("http://echo.local"), Err(Error::NotFound(_))));

        // the endpoint is free again
        let retry = registry.register(card("Echo", "http://echo.local", &[]), None).await;
        assert!(matches!(retry, Err(Error::Index(_))));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    struct SlowIndex;

    #[async_trait]
    impl Discovery for SlowIndex {
        fn name(&self) -> &'static str { "slow" }

        async fn index(&self, _card: &AgentCard) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(())
        }

        async fn query(&self, _text: &str, _k: usize, _catalog: &[AgentCard]) -> Result<Vec<String>> { Ok(Vec::new()) }
    }

    #[tokio::test]
    async fn abandoned_registration_releases_the_endpoint() {
        let registry = AgentRegistry::with_discovery(Arc::new(SlowIndex));
        let entry = card("Echo", "http://echo.local", &[]);

        let first = tokio::time::timeout(std::time::Duration::from_millis(20), registry.register(entry.clone(), None)).await;
        assert!(first.is_err());
        assert!(registry.is_empty());

        registry.register(entry.clone(), None).await.unwrap();
        assert_eq!(registry.get("http://echo.local").unwrap(), entry);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_has_one_winner() {
        let registry = semantic();

        let handles = (0..8)
            .map(|n| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.register(card(&format!("Racer {n}"), "http://race.local", &[]), None).await })
            })
            .collect::<Vec<_>>();

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(Error::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected: {other}"),
            }
        }

        assert_eq!((wins, conflicts), (1, 7));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn semantic_search_is_bounded_and_only_returns_registered() {
        let registry = semantic();
        assert!(registry.search("anything", 3).await.unwrap().is_empty());

        for (name, skill) in [("Weather", "Forecast"), ("Translator", "Translate"), ("Calendar", "Schedule"), ("Mail", "Send email")] {
            let endpoint = format!("http://{}.local", name.to_lowercase());
            registry.register(card(name, &endpoint, &[skill]), None).await.unwrap();
        }

        let found = registry.search("agent", 3).await.unwrap();
        assert!(found.len() <= 3);

        let registered = registry.list();
        assert!(found.iter().all(|card| registered.contains(card)));

        let top = registry.search("weather forecast", 3).await.unwrap();
        assert_eq!(top[0].name, "Weather");
    }

    #[tokio::test]
    async fn exact_search_filters_the_list() {
        let registry = AgentRegistry::new();
        registry.register(card("Weather", "http://weather.local", &["Forecast"]), None).await.unwrap();
        registry.register(card("Translator", "http://translate.local", &["Translate"]), None).await.unwrap();

        let found = registry.search("translate", 3).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].endpoint, "http://translate.local");
        assert_eq!(registry.discovery(), "exact");
    }
}
