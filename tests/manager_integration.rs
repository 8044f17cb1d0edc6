//! `PoolManager` wiring against a real `EthereumAdapter` pool backed by a mock
//! JSON-RPC endpoint: registration, prewarm, scoped acquisition with guaranteed
//! release, and aggregate stats.

use serde_json::json;
use swap_rpc_pool::manager::PoolManager;
use swap_rpc_pool::types::{Endpoint, EthereumPoolConfig, PoolConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_eth_server(chain_id_hex: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": chain_id_hex
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn registers_prewarms_and_serves_scoped_acquisition() {
    let server = mock_eth_server("0x1").await;
    let manager = PoolManager::new();

    let mut base = PoolConfig::new("eth-mock", vec![Endpoint::new(server.uri())]);
    base.min_connections = 1;
    base.max_connections = 2;

    manager
        .add_ethereum_pool(
            "eth-mock",
            EthereumPoolConfig {
                base,
                chain_id: Some(1),
                throttle_limit: None,
                throttle_slot_interval_ms: None,
            },
        )
        .await
        .unwrap();

    manager.start().await;

    let stats = manager.get_stats();
    let pool_stats = stats.ethereum.get("eth-mock").expect("pool registered");
    assert_eq!(pool_stats.total_connections, 1, "prewarm should create min_connections");

    let result = manager
        .with_ethereum_client("eth-mock", |_client| async move { 42 })
        .await
        .unwrap();
    assert_eq!(result, 42);

    // The leased connection must be released back to idle after the closure runs.
    let stats = manager.get_stats();
    let pool_stats = stats.ethereum.get("eth-mock").unwrap();
    assert_eq!(pool_stats.active_connections, 0);

    manager.stop().await;
}

#[tokio::test]
async fn with_ethereum_client_releases_even_when_unregistered_pool() {
    let manager = PoolManager::new();
    let result = manager
        .with_ethereum_client("does-not-exist", |_client| async move { 1 })
        .await;
    assert!(matches!(
        result,
        Err(swap_rpc_pool::error::PoolError::PoolNotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_pool_registration_is_rejected() {
    let server = mock_eth_server("0x1").await;
    let manager = PoolManager::new();
    let base = PoolConfig::new("eth-dup", vec![Endpoint::new(server.uri())]);
    let config = EthereumPoolConfig {
        base: base.clone(),
        chain_id: Some(1),
        throttle_limit: None,
        throttle_slot_interval_ms: None,
    };

    manager.add_ethereum_pool("eth-dup", config.clone()).await.unwrap();
    let second = manager.add_ethereum_pool("eth-dup", config).await;
    assert!(matches!(
        second,
        Err(swap_rpc_pool::error::PoolError::DuplicatePool(_))
    ));
}
