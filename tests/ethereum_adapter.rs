//! Integration tests for the Ethereum adapter against a mocked JSON-RPC
//! endpoint — exercises the real `ethers::providers::Provider<Http>` wire path.

use std::time::Duration;

use serde_json::json;
use swap_rpc_pool::adapters::PoolAdapter;
use swap_rpc_pool::adapters::ethereum::EthereumAdapter;
use swap_rpc_pool::types::Endpoint;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn create_client_accepts_matching_chain_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x1"
        })))
        .mount(&server)
        .await;

    let adapter = EthereumAdapter::new(Some(1));
    let endpoint = Endpoint::new(server.uri());
    let client = adapter.create_client(&endpoint, Duration::from_secs(2)).await;
    assert!(client.is_ok());
}

#[tokio::test]
async fn create_client_rejects_chain_id_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x2"
        })))
        .mount(&server)
        .await;

    let adapter = EthereumAdapter::new(Some(1));
    let endpoint = Endpoint::new(server.uri());
    let result = adapter.create_client(&endpoint, Duration::from_secs(2)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn probe_client_reports_unhealthy_at_zero_block_height() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x0"
        })))
        .mount(&server)
        .await;

    let adapter = EthereumAdapter::new(None);
    let endpoint = Endpoint::new(server.uri());
    let client = adapter
        .create_client(&endpoint, Duration::from_secs(2))
        .await
        .unwrap();

    let healthy = adapter.probe_client(&client).await.unwrap();
    assert!(!healthy);
}

#[tokio::test]
async fn probe_client_reports_healthy_at_nonzero_block_height() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x2a"
        })))
        .mount(&server)
        .await;

    let adapter = EthereumAdapter::new(None);
    let endpoint = Endpoint::new(server.uri());
    let client = adapter
        .create_client(&endpoint, Duration::from_secs(2))
        .await
        .unwrap();

    let healthy = adapter.probe_client(&client).await.unwrap();
    assert!(healthy);
}
