//! End-to-end behavior of `BasePool` against a fake, in-memory adapter: weighted
//! round-robin distribution, capacity failover, circuit breaker trip/recovery,
//! and idle reaping.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use swap_rpc_pool::adapters::PoolAdapter;
use swap_rpc_pool::pool::BasePool;
use swap_rpc_pool::types::{Endpoint, PoolConfig};

#[derive(Clone)]
struct FakeAdapter {
    fail_create: Arc<Mutex<HashSet<String>>>,
    fail_probe: Arc<Mutex<HashSet<String>>>,
    create_calls: Arc<AtomicUsize>,
    prewarm_enabled: Arc<AtomicBool>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self {
            fail_create: Arc::new(Mutex::new(HashSet::new())),
            fail_probe: Arc::new(Mutex::new(HashSet::new())),
            create_calls: Arc::new(AtomicUsize::new(0)),
            prewarm_enabled: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl FakeAdapter {
    fn new() -> Self {
        Self::default()
    }

    fn set_failing(&self, url: &str) {
        self.fail_create.lock().unwrap().insert(url.to_string());
    }

    fn clear_failing(&self, url: &str) {
        self.fail_create.lock().unwrap().remove(url);
    }

    fn disable_prewarm(&self) {
        self.prewarm_enabled.store(false, Ordering::Relaxed);
    }
}

#[async_trait]
impl PoolAdapter for FakeAdapter {
    type Client = Arc<String>;

    async fn create_client(
        &self,
        endpoint: &Endpoint,
        _timeout: Duration,
    ) -> anyhow::Result<Self::Client> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_create.lock().unwrap().contains(&endpoint.url) {
            anyhow::bail!("forced create failure for {}", endpoint.url);
        }
        Ok(Arc::new(endpoint.url.clone()))
    }

    async fn probe_client(&self, client: &Self::Client) -> anyhow::Result<bool> {
        Ok(!self.fail_probe.lock().unwrap().contains(client.as_str()))
    }

    async fn close_client(&self, _client: Self::Client) {}

    fn prewarm_enabled(&self) -> bool {
        self.prewarm_enabled.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn weighted_round_robin_alternates_equal_weight_endpoints() {
    let endpoints = vec![Endpoint::new("http://a"), Endpoint::new("http://b")];
    let config = PoolConfig::new("rr-test", endpoints);
    let pool = BasePool::new(config, FakeAdapter::new());
    pool.start().await;

    let mut seen = Vec::new();
    for _ in 0..10 {
        let (client, release) = pool.acquire().await.unwrap();
        seen.push((*client).clone());
        release.release();
    }

    let a_count = seen.iter().filter(|u| u.as_str() == "http://a").count();
    let b_count = seen.iter().filter(|u| u.as_str() == "http://b").count();
    assert_eq!(a_count, 5);
    assert_eq!(b_count, 5);

    pool.stop().await;
}

#[tokio::test]
async fn capacity_exhaustion_fails_over_to_alternate_endpoint() {
    let endpoints = vec![
        Endpoint::new("http://heavy").with_weight(100),
        Endpoint::new("http://light").with_weight(1),
    ];
    let mut config = PoolConfig::new("failover-test", endpoints);
    config.max_connections = 1;
    config.min_connections = 0;
    let pool = BasePool::new(config, FakeAdapter::new());
    pool.start().await;

    // First acquisition lands on the heavily-weighted endpoint and fills its
    // single slot.
    let (first_client, first_release) = pool.acquire().await.unwrap();
    assert_eq!(first_client.as_str(), "http://heavy");

    // The heavy endpoint is still overwhelmingly likely to be selected next, but
    // it's now at capacity, so acquire must fail over to the alternate.
    let (second_client, second_release) = pool.acquire().await.unwrap();
    assert_eq!(second_client.as_str(), "http://light");

    first_release.release();
    second_release.release();
    pool.stop().await;
}

#[tokio::test]
async fn capacity_exhaustion_on_both_endpoints_is_reported() {
    let endpoints = vec![Endpoint::new("http://only")];
    let mut config = PoolConfig::new("exhausted-test", endpoints);
    config.max_connections = 1;
    config.min_connections = 0;
    let pool = BasePool::new(config, FakeAdapter::new());
    pool.start().await;

    let (_client, _release) = pool.acquire().await.unwrap();
    let result = pool.acquire().await;
    assert!(matches!(
        result,
        Err(swap_rpc_pool::error::PoolError::CapacityExhausted { .. })
    ));

    pool.stop().await;
}

#[tokio::test]
async fn circuit_breaker_opens_then_recovers_after_timeout() {
    let endpoints = vec![Endpoint::new("http://flaky")];
    let mut config = PoolConfig::new("breaker-test", endpoints);
    config.circuit_breaker_threshold = 2;
    config.circuit_breaker_timeout_ms = 50;
    config.min_connections = 0;
    let adapter = FakeAdapter::new();
    adapter.set_failing("http://flaky");
    let pool = BasePool::new(config, adapter.clone());
    pool.start().await;

    assert!(pool.acquire().await.is_err());
    assert!(pool.acquire().await.is_err());

    // Breaker should now be open: a third attempt is rejected before any create
    // call is attempted.
    let calls_before = adapter.create_calls.load(Ordering::Relaxed);
    let result = pool.acquire().await;
    assert!(matches!(
        result,
        Err(swap_rpc_pool::error::PoolError::CircuitBreakerOpen { .. })
    ));
    assert_eq!(adapter.create_calls.load(Ordering::Relaxed), calls_before);

    tokio::time::sleep(Duration::from_millis(80)).await;
    adapter.clear_failing("http://flaky");

    let (client, release) = pool.acquire().await.unwrap();
    assert_eq!(client.as_str(), "http://flaky");
    release.release();

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn chain_id_mismatch_exhausts_the_endpoint_into_no_healthy_endpoints() {
    // Simulates an endpoint whose remote reports the wrong chain id: every
    // creation attempt fails. The breaker threshold is set high enough that it
    // never trips during this test, isolating the health-check-driven path to
    // `NoHealthyEndpoints` from the breaker-driven path to `CircuitBreakerOpen`
    // covered separately above.
    let endpoints = vec![Endpoint::new("http://mismatched")];
    let mut config = PoolConfig::new("mismatch-test", endpoints);
    config.min_connections = 0;
    config.circuit_breaker_threshold = 1_000;
    config.health_check_interval_ms = 20;
    let adapter = FakeAdapter::new();
    adapter.set_failing("http://mismatched");
    let pool = BasePool::new(config, adapter.clone());
    pool.start().await;

    let result = pool.acquire().await;
    assert!(matches!(
        result,
        Err(swap_rpc_pool::error::PoolError::ClientCreateFailed { .. })
    ));

    // Let the health-check loop observe the endpoint directly: with no idle
    // client to reuse it attempts its own `create_client`, which also fails and
    // marks `EndpointHealth.healthy = false`.
    tokio::time::advance(Duration::from_millis(30)).await;
    tokio::task::yield_now().await;

    let result = pool.acquire().await;
    assert!(matches!(
        result,
        Err(swap_rpc_pool::error::PoolError::NoHealthyEndpoints { .. })
    ));

    pool.stop().await;
}

#[tokio::test]
async fn prewarm_is_skipped_when_the_adapter_opts_out() {
    let endpoints = vec![Endpoint::new("http://a")];
    let mut config = PoolConfig::new("prewarm-test", endpoints);
    config.min_connections = 1;
    let adapter = FakeAdapter::new();
    adapter.disable_prewarm();
    let pool = BasePool::new(config, adapter.clone());

    pool.start().await;

    assert_eq!(adapter.create_calls.load(Ordering::Relaxed), 0);
    assert_eq!(pool.get_stats().total_connections, 0);

    pool.stop().await;
}

#[tokio::test]
async fn acquire_on_a_signing_pool_fails_fast_without_a_wallet() {
    use swap_rpc_pool::adapters::cosmos_signing::CosmosSigningAdapter;

    let endpoints = vec![Endpoint::new("http://unused")];
    let mut config = PoolConfig::new("signing-test", endpoints);
    config.min_connections = 0;
    let adapter = CosmosSigningAdapter::new("test-chain-1", "cosmos", None);
    let pool = BasePool::new(config, adapter);
    pool.start().await;

    let result = pool.acquire().await;
    assert!(matches!(
        result,
        Err(swap_rpc_pool::error::PoolError::WalletRequired { .. })
    ));

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_probe_marks_idle_client_unhealthy_and_stops_reuse() {
    let endpoints = vec![Endpoint::new("http://probed")];
    let mut config = PoolConfig::new("probe-test", endpoints);
    config.min_connections = 0;
    config.health_check_interval_ms = 50;
    config.max_connections = 10;
    let adapter = FakeAdapter::new();
    let pool = BasePool::new(config, adapter.clone());
    pool.start().await;

    let (_client, release) = pool.acquire().await.unwrap();
    release.release();
    assert_eq!(pool.get_stats().idle_connections, 1);

    adapter.fail_probe.lock().unwrap().insert("http://probed".to_string());
    tokio::time::advance(Duration::from_millis(60)).await;
    tokio::task::yield_now().await;

    let stats = pool.get_stats();
    assert_eq!(stats.failed_connections, 1);
    assert_eq!(stats.idle_connections, 0);

    // acquire must skip the now-unhealthy idle client and create a fresh one.
    let calls_before = adapter.create_calls.load(Ordering::Relaxed);
    let (_client, release) = pool.acquire().await.unwrap();
    assert_eq!(adapter.create_calls.load(Ordering::Relaxed), calls_before + 1);
    release.release();

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn idle_clients_are_reaped_after_timeout() {
    let endpoints = vec![Endpoint::new("http://idle")];
    let mut config = PoolConfig::new("reap-test", endpoints);
    config.idle_timeout_ms = 100;
    config.min_connections = 0;
    config.health_check_interval_ms = 100_000;
    let pool = BasePool::new(config, FakeAdapter::new());
    pool.start().await;

    let (_client, release) = pool.acquire().await.unwrap();
    release.release();

    assert_eq!(pool.get_stats().total_connections, 1);

    tokio::time::advance(Duration::from_millis(250)).await;
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_millis(10)).await;
    tokio::task::yield_now().await;

    assert_eq!(pool.get_stats().total_connections, 0);

    pool.stop().await;
}
