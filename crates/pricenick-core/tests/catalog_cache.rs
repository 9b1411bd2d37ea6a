use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pricenick_core::{
    CacheState, CanonicalModelRecord, CatalogCache, FetchError, HealthStatus, Integration,
    IntegrationRegistry, PriceError, ProviderDescriptor, ProviderOffer, TokenPrice,
};

/// Scripted provider: serves fixed rows, can be switched to failing, and can
/// delay individual calls.
struct Mock {
    descriptor: ProviderDescriptor,
    rows: Vec<(&'static str, &'static str, u64, f64, f64)>,
    failing: AtomicBool,
    calls: AtomicUsize,
    /// Delay applied to the first call only.
    first_delay: Duration,
    /// Delay applied to every call.
    delay: Duration,
}

impl Mock {
    fn new(key: &str, rows: Vec<(&'static str, &'static str, u64, f64, f64)>) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(key, &key.to_uppercase(), "https://example.com")
                .with_timeout(Duration::from_secs(30)),
            rows,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            first_delay: Duration::ZERO,
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_first_delay(mut self, delay: Duration) -> Self {
        self.first_delay = delay;
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = timeout;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Integration for Mock {
    async fn initialize(&self) -> bool {
        true
    }

    async fn fetch_models(&self) -> Result<Vec<CanonicalModelRecord>, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 && !self.first_delay.is_zero() {
            tokio::time::sleep(self.first_delay).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Connectivity("connection refused".into()));
        }
        Ok(self
            .rows
            .iter()
            .map(|&(brand, name, window, input, output)| CanonicalModelRecord {
                brand: brand.into(),
                name: name.into(),
                data_amount: None,
                window,
                offer: ProviderOffer::from_descriptor(
                    &self.descriptor,
                    TokenPrice::new(input, output, "USD"),
                ),
            })
            .collect())
    }
}

fn cache_with(mocks: Vec<Arc<Mock>>) -> CatalogCache {
    let mut registry = IntegrationRegistry::new();
    for m in mocks {
        registry.register(m.descriptor.clone(), m).unwrap();
    }
    CatalogCache::new(Arc::new(registry))
}

#[tokio::test]
async fn glm_from_two_providers_merges_and_recommends_cheapest() {
    let a = Arc::new(Mock::new("a", vec![("Z.AI", "GLM", 128_000, 0.14, 0.56)]));
    let b = Arc::new(Mock::new("b", vec![("Z.AI", "glm", 64_000, 0.20, 0.60)]));
    let cache = cache_with(vec![a, b]);

    let catalog = cache.get().await.unwrap();
    assert_eq!(catalog.len(), 1);
    let glm = &catalog.models[0];
    assert_eq!(glm.window, 128_000);
    assert_eq!(glm.providers.len(), 2);
    assert_eq!(glm.recommended_provider, "a");
    assert_eq!(catalog.find("GLM").len(), 1);
}

#[tokio::test]
async fn get_without_invalidate_returns_same_catalog() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]));
    let cache = cache_with(vec![a.clone()]);
    assert_eq!(cache.state(), CacheState::Empty);

    let first = cache.get().await.unwrap();
    let second = cache.get().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.fetched_at, second.fetched_at);
    assert_eq!(a.calls(), 1);
    assert_eq!(cache.state(), CacheState::Ready);
}

#[tokio::test]
async fn invalidate_triggers_a_new_cycle() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]));
    let cache = cache_with(vec![a.clone()]);

    let first = cache.get().await.unwrap();
    cache.invalidate();
    let second = cache.get().await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.cycle > first.cycle);
    assert!(second.fetched_at >= first.fetched_at);
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn invalidated_cache_is_populating_until_next_cycle() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]));
    let cache = cache_with(vec![a.clone()]);

    cache.get().await.unwrap();
    assert_eq!(cache.state(), CacheState::Ready);

    cache.invalidate();
    assert_eq!(cache.state(), CacheState::Populating);
    assert!(cache.peek().is_some());

    cache.get().await.unwrap();
    assert_eq!(cache.state(), CacheState::Ready);
    assert_eq!(a.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn one_timeout_does_not_block_the_others() {
    let a = Arc::new(Mock::new("a", vec![("B", "shared", 1000, 2.0, 1.0)]));
    let slow = Arc::new(
        Mock::new("slow", vec![("B", "shared", 1000, 0.1, 0.1)])
            .with_delay(Duration::from_secs(600))
            .with_timeout(Duration::from_secs(5)),
    );
    let c = Arc::new(Mock::new("c", vec![("B", "only-c", 1000, 1.0, 1.0)]));
    let cache = cache_with(vec![a, slow, c]);

    let catalog = cache.get().await.unwrap();
    assert_eq!(catalog.len(), 2);
    let found = catalog.find("shared");
    let shared = found[0];
    assert_eq!(shared.providers.len(), 1);
    assert_eq!(shared.recommended_provider, "a");
    assert_eq!(catalog.by_provider("c").len(), 1);
    assert!(catalog.by_provider("slow").is_empty());

    let health = cache.registry().health();
    assert!(matches!(&health[1].status, HealthStatus::Failed(r) if r.contains("timed out")));
    assert_eq!(health[0].status, HealthStatus::Available);
}

#[tokio::test]
async fn total_failure_without_previous_catalog_is_empty() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]));
    let b = Arc::new(Mock::new("b", vec![("B", "m", 1000, 1.0, 1.0)]));
    a.fail(true);
    b.fail(true);
    let cache = cache_with(vec![a.clone(), b.clone()]);

    let err = cache.get().await.unwrap_err();
    assert!(matches!(err, PriceError::AggregateEmpty { failed: 2 }));
    assert_eq!(cache.state(), CacheState::Empty);
    assert!(cache.peek().is_none());

    a.fail(false);
    let catalog = cache.get().await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(cache.state(), CacheState::Ready);
}

#[tokio::test]
async fn total_failure_keeps_previous_catalog() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]));
    let cache = cache_with(vec![a.clone()]);

    let good = cache.get().await.unwrap();
    a.fail(true);
    cache.invalidate();
    assert_eq!(cache.state(), CacheState::Populating);

    let kept = cache.get().await.unwrap();
    assert!(Arc::ptr_eq(&good, &kept));
    assert_eq!(cache.state(), CacheState::Ready);

    // The invalidation is still pending, so recovery is picked up.
    a.fail(false);
    let fresh = cache.get().await.unwrap();
    assert!(fresh.cycle > good.cycle);
    assert_eq!(a.calls(), 3);
}

#[tokio::test]
async fn no_providers_is_aggregate_empty() {
    let cache = CatalogCache::new(Arc::new(IntegrationRegistry::new()));
    assert!(matches!(
        cache.get().await,
        Err(PriceError::AggregateEmpty { failed: 0 })
    ));
}

#[tokio::test]
async fn provider_returning_nothing_still_publishes() {
    let empty = Arc::new(Mock::new("empty", vec![]));
    let cache = cache_with(vec![empty]);
    let catalog = cache.get().await.unwrap();
    assert!(catalog.is_empty());
    assert_eq!(cache.state(), CacheState::Ready);
}

#[tokio::test(start_paused = true)]
async fn concurrent_gets_share_one_cycle() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]).with_delay(Duration::from_secs(2)));
    let cache = cache_with(vec![a.clone()]);

    let (x, y) = tokio::join!(cache.get(), cache.get());
    assert!(Arc::ptr_eq(&x.unwrap(), &y.unwrap()));
    assert_eq!(a.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn state_is_populating_during_a_cycle() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]).with_delay(Duration::from_secs(5)));
    let cache = Arc::new(cache_with(vec![a]));

    let task = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get().await.map(|c| c.cycle) })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.state(), CacheState::Populating);

    assert_eq!(task.await.unwrap().unwrap(), 1);
    assert_eq!(cache.state(), CacheState::Ready);
}

#[tokio::test(start_paused = true)]
async fn slow_superseded_cycle_does_not_overwrite_newer_catalog() {
    let a = Arc::new(
        Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]).with_first_delay(Duration::from_secs(10)),
    );
    let cache = cache_with(vec![a.clone()]);

    let slow = cache.refresh();
    let fast = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cache.invalidate();
        cache.refresh().await
    };
    let (slow, fast) = tokio::join!(slow, fast);
    let (slow, fast) = (slow.unwrap(), fast.unwrap());

    assert_eq!(fast.cycle, 2);
    // The slow cycle finished last but hands back the newer catalog.
    assert!(Arc::ptr_eq(&slow, &fast));
    assert_eq!(cache.peek().unwrap().cycle, 2);

    // Published under the latest invalidation, so no further fetch.
    let current = cache.get().await.unwrap();
    assert!(Arc::ptr_eq(&current, &fast));
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn disabling_a_provider_drops_its_offers_next_cycle() {
    let a = Arc::new(Mock::new("a", vec![("B", "m", 1000, 1.0, 1.0)]));
    let b = Arc::new(Mock::new("b", vec![("B", "m", 1000, 0.5, 1.0)]));
    let cache = cache_with(vec![a, b]);

    let before = cache.get().await.unwrap();
    assert_eq!(before.models[0].recommended_provider, "b");

    cache.registry().set_enabled("b", false).unwrap();
    cache.invalidate();
    let after = cache.get().await.unwrap();
    assert_eq!(after.models[0].providers.len(), 1);
    assert_eq!(after.models[0].recommended_provider, "a");

    let health = cache.registry().health();
    assert_eq!(health[1].status, HealthStatus::Disabled);
}
