use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep, timeout};
use tunnelsync_events::EventSubscription;
use tunnelsync_providers::{
    InMemoryApiRepository, InfrastructureManager, InfrastructureMapper, ProviderError,
    ProviderEvent, ProviderResult,
};
use tunnelsync_types::{
    Provider, ProviderCache, ProviderId, ProviderInfrastructure, ProviderServer, ServerMetadata,
};

// ── Helpers ──────────────────────────────────────────────────────

fn day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
}

fn sample_index() -> Vec<Provider> {
    vec![
        Provider::new("acme", "Acme VPN", ["openvpn".into()]),
        Provider::new("zephyr", "Zephyr", ["wireguard".into()]),
    ]
}

fn sample_infrastructure(last_update: DateTime<Utc>) -> ProviderInfrastructure {
    ProviderInfrastructure {
        presets: Vec::new(),
        servers: vec![ProviderServer {
            metadata: ServerMetadata {
                provider_id: "acme".into(),
                category_name: "default".to_string(),
                country_code: "US".to_string(),
                other_country_codes: None,
                area: None,
            },
            server_id: "us-1".to_string(),
            hostname: None,
            ip_addresses: None,
            supported_module_types: None,
            supported_preset_ids: None,
        }],
        cache: Some(ProviderCache {
            last_update: Some(last_update),
            tag: None,
        }),
    }
}

async fn wait_until<F>(mut condition: F)
where
    F: AsyncFnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if condition().await {
            return;
        }
        assert!(Instant::now() < deadline, "condition not met in time");
        sleep(Duration::from_millis(10)).await;
    }
}

async fn next_event(sub: &mut EventSubscription<ProviderEvent>) -> ProviderEvent {
    timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

/// What a [`ScriptedMapper`] answers to an infrastructure fetch.
enum Script {
    Succeed(ProviderInfrastructure),
    NotModified,
    Fail,
}

/// A mapper with canned responses, call counters and an optional gate
/// blocking each call until a permit is released.
struct ScriptedMapper {
    index: Option<Vec<Provider>>,
    script: StdMutex<Script>,
    gate: Option<Semaphore>,
    index_calls: AtomicUsize,
    infrastructure_calls: AtomicUsize,
    seen_cache: StdMutex<Option<ProviderCache>>,
}

impl ScriptedMapper {
    fn succeeding(index: Vec<Provider>, infrastructure: ProviderInfrastructure) -> Self {
        Self::new(Some(index), Script::Succeed(infrastructure), None)
    }

    fn failing() -> Self {
        Self::new(None, Script::Fail, None)
    }

    fn not_modified() -> Self {
        Self::new(None, Script::NotModified, None)
    }

    fn gated(infrastructure: ProviderInfrastructure) -> Self {
        Self::new(
            None,
            Script::Succeed(infrastructure),
            Some(Semaphore::new(0)),
        )
    }

    fn new(index: Option<Vec<Provider>>, script: Script, gate: Option<Semaphore>) -> Self {
        Self {
            index,
            script: StdMutex::new(script),
            gate,
            index_calls: AtomicUsize::new(0),
            infrastructure_calls: AtomicUsize::new(0),
            seen_cache: StdMutex::new(None),
        }
    }

    fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    fn release(&self, permits: usize) {
        self.gate
            .as_ref()
            .expect("mapper is not gated")
            .add_permits(permits);
    }

    fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    fn infrastructure_calls(&self) -> usize {
        self.infrastructure_calls.load(Ordering::SeqCst)
    }

    fn seen_cache(&self) -> Option<ProviderCache> {
        self.seen_cache.lock().unwrap().clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
    }
}

#[async_trait]
impl InfrastructureMapper for ScriptedMapper {
    async fn index(&self) -> ProviderResult<Vec<Provider>> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        match &self.index {
            Some(providers) => Ok(providers.clone()),
            None => Err(ProviderError::Network("index unavailable".to_string())),
        }
    }

    async fn infrastructure(
        &self,
        _provider_id: &ProviderId,
        cache: Option<&ProviderCache>,
    ) -> ProviderResult<ProviderInfrastructure> {
        self.infrastructure_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_cache.lock().unwrap() = cache.cloned();
        self.pass_gate().await;
        match &*self.script.lock().unwrap() {
            Script::Succeed(infrastructure) => Ok(infrastructure.clone()),
            Script::NotModified => Err(ProviderError::NotModified),
            Script::Fail => Err(ProviderError::Network("unreachable".to_string())),
        }
    }
}

fn make_manager(
    mappers: Vec<Arc<dyn InfrastructureMapper>>,
) -> (Arc<InfrastructureManager>, Arc<InMemoryApiRepository>) {
    let repository = Arc::new(InMemoryApiRepository::new());
    let manager = Arc::new(InfrastructureManager::new(mappers, repository.clone()));
    (manager, repository)
}

// ── Index fetch ──────────────────────────────────────────────────

#[tokio::test]
async fn fetch_index_stores_and_publishes() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, _) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let mut events = manager.subscribe();

    manager.fetch_index().await.unwrap();
    assert_eq!(mapper.index_calls(), 1);

    match next_event(&mut events).await {
        ProviderEvent::IndexUpdated(providers) => assert_eq!(providers, sample_index()),
        other => panic!("unexpected event: {other:?}"),
    }
    wait_until(async || { manager.providers().await.len() == 2 }).await;
    assert!(manager.provider(&"acme".into()).await.is_some());
    assert!(manager.provider(&"nope".into()).await.is_none());
}

#[tokio::test]
async fn fetch_index_falls_back_to_next_mapper() {
    let broken = Arc::new(ScriptedMapper::failing());
    let working = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, _) = make_manager(vec![broken.clone(), working.clone()]);
    manager.observe().await;

    manager.fetch_index().await.unwrap();
    assert_eq!(broken.index_calls(), 1);
    assert_eq!(working.index_calls(), 1);
    wait_until(async || { manager.providers().await.len() == 2 }).await;
}

#[tokio::test]
async fn fetch_index_surfaces_last_error_when_all_mappers_fail() {
    let (manager, _) = make_manager(vec![
        Arc::new(ScriptedMapper::failing()),
        Arc::new(ScriptedMapper::failing()),
    ]);
    manager.observe().await;

    let error = manager.fetch_index().await.unwrap_err();
    assert!(matches!(error, ProviderError::Network(_)));
    assert!(manager.providers().await.is_empty());
}

// ── Infrastructure fetch ─────────────────────────────────────────

#[tokio::test]
async fn fetch_infrastructure_stores_snapshot_and_token() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, repository) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let acme = ProviderId::from("acme");

    manager.fetch_infrastructure(&acme).await.unwrap();
    assert_eq!(mapper.infrastructure_calls(), 1);
    assert_eq!(mapper.seen_cache(), None);
    assert!(repository.infrastructure(&acme).is_some());
    wait_until(async || {
        manager
            .cache_for(&acme)
            .await
            .is_some_and(|c| c.last_update == Some(day(1)))
    })
    .await;
}

#[tokio::test]
async fn fetch_infrastructure_passes_cached_validators() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, _) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let acme = ProviderId::from("acme");

    manager.fetch_infrastructure(&acme).await.unwrap();
    wait_until(async || { manager.cache_for(&acme).await.is_some() }).await;

    mapper.set_script(Script::NotModified);
    manager.fetch_infrastructure(&acme).await.unwrap();
    let seen = mapper.seen_cache().expect("validators passed");
    assert_eq!(seen.last_update, Some(day(1)));
}

#[tokio::test]
async fn not_modified_is_success_and_stores_nothing() {
    let mapper = Arc::new(ScriptedMapper::not_modified());
    let (manager, repository) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let acme = ProviderId::from("acme");

    manager.fetch_infrastructure(&acme).await.unwrap();
    assert_eq!(mapper.infrastructure_calls(), 1);
    assert!(repository.infrastructure(&acme).is_none());
}

#[tokio::test]
async fn concurrent_fetch_for_same_provider_is_deduplicated() {
    let mapper = Arc::new(ScriptedMapper::gated(sample_infrastructure(day(1))));
    let (manager, repository) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let acme = ProviderId::from("acme");

    let first = {
        let manager = manager.clone();
        let acme = acme.clone();
        tokio::spawn(async move { manager.fetch_infrastructure(&acme).await })
    };
    wait_until(async || { manager.is_loading() }).await;

    // silently discarded while the first fetch is in flight
    manager.fetch_infrastructure(&acme).await.unwrap();
    assert_eq!(mapper.infrastructure_calls(), 1);

    mapper.release(1);
    first.await.unwrap().unwrap();
    assert!(!manager.is_loading());
    assert!(repository.infrastructure(&acme).is_some());

    // the slot is free again afterwards
    mapper.release(1);
    manager.fetch_infrastructure(&acme).await.unwrap();
    assert_eq!(mapper.infrastructure_calls(), 2);
}

#[tokio::test]
async fn fetches_for_different_providers_run_independently() {
    let mapper = Arc::new(ScriptedMapper::gated(sample_infrastructure(day(1))));
    let (manager, _) = make_manager(vec![mapper.clone()]);
    manager.observe().await;

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.fetch_infrastructure(&"acme".into()).await })
    };
    wait_until(async || { manager.is_loading() }).await;

    // a different provider is not deduplicated against the first
    mapper.release(2);
    manager.fetch_infrastructure(&"zephyr".into()).await.unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(mapper.infrastructure_calls(), 2);
}

// ── Query view and cache reset ───────────────────────────────────

#[tokio::test]
async fn provider_repository_fetches_once_then_serves_cached() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, _) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let acme = ProviderId::from("acme");

    let view = manager.provider_repository(&acme).await.unwrap();
    assert_eq!(view.servers().len(), 1);
    assert_eq!(mapper.infrastructure_calls(), 1);

    wait_until(async || { manager.cache_for(&acme).await.is_some() }).await;
    let view = manager.provider_repository(&acme).await.unwrap();
    assert_eq!(view.servers().len(), 1);
    assert_eq!(mapper.infrastructure_calls(), 1);
}

#[tokio::test]
async fn reset_cache_drops_tokens_and_publishes() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, repository) = make_manager(vec![mapper.clone()]);
    manager.observe().await;
    let acme = ProviderId::from("acme");

    manager.fetch_infrastructure(&acme).await.unwrap();
    wait_until(async || { manager.cache_for(&acme).await.is_some() }).await;

    manager.reset_cache().await;
    wait_until(async || { manager.cache_for(&acme).await.is_none() }).await;
    assert!(repository.infrastructure(&acme).is_none());

    // a later fetch starts over without validators
    manager.fetch_infrastructure(&acme).await.unwrap();
    assert_eq!(mapper.seen_cache(), None);
}

#[tokio::test]
async fn reset_cache_for_only_touches_given_providers() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, repository) = make_manager(vec![mapper]);
    manager.observe().await;
    let acme = ProviderId::from("acme");
    let zephyr = ProviderId::from("zephyr");

    manager.fetch_infrastructure(&acme).await.unwrap();
    manager.fetch_infrastructure(&zephyr).await.unwrap();

    manager.reset_cache_for(&[acme.clone()]).await;
    assert!(repository.infrastructure(&acme).is_none());
    assert!(repository.infrastructure(&zephyr).is_some());
}

#[tokio::test]
async fn cache_updates_are_published_as_events() {
    let mapper = Arc::new(ScriptedMapper::succeeding(
        sample_index(),
        sample_infrastructure(day(1)),
    ));
    let (manager, _) = make_manager(vec![mapper]);
    manager.observe().await;
    let mut events = manager.subscribe();
    let acme = ProviderId::from("acme");

    manager.fetch_infrastructure(&acme).await.unwrap();
    match next_event(&mut events).await {
        ProviderEvent::CacheUpdated(caches) => {
            assert_eq!(caches[&acme].last_update, Some(day(1)));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
