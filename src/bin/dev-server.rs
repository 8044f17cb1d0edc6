//! Dev harness: wires a `PoolManager` from the environment, starts the
//! Prometheus exporter and metrics collector, logs aggregate stats
//! periodically, and shuts down cleanly on Ctrl-C.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use swap_rpc_pool::config::AppConfig;
use swap_rpc_pool::manager::PoolManager;
use swap_rpc_pool::metrics::{init_metrics, MetricsCollector};
use swap_rpc_pool::types::{CosmosPoolConfig, EthereumPoolConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting connection pool dev server");

    let config = AppConfig::from_env()?;
    info!(environment = ?config.environment, "configuration loaded");

    let manager = PoolManager::new();

    if !config.ethereum_endpoints.is_empty() {
        let pool_config = config
            .environment
            .pool_config("ethereum-dev", config.ethereum_endpoints.clone());
        manager
            .add_ethereum_pool(
                "ethereum-dev",
                EthereumPoolConfig {
                    base: pool_config,
                    chain_id: config.ethereum_chain_id,
                    throttle_limit: None,
                    throttle_slot_interval_ms: None,
                },
            )
            .await?;
        info!("registered ethereum-dev pool");
    }

    if !config.cosmos_query_endpoints.is_empty() {
        let pool_config = config
            .environment
            .pool_config("cosmos-query-dev", config.cosmos_query_endpoints.clone());
        manager
            .add_cosmos_query_pool(
                "cosmos-query-dev",
                CosmosPoolConfig {
                    base: pool_config,
                    chain_id: config.cosmos_chain_id.clone(),
                    address_prefix: config.cosmos_address_prefix.clone(),
                    gas_price: None,
                },
            )
            .await?;
        info!("registered cosmos-query-dev pool");
    }

    if !config.cosmos_signing_endpoints.is_empty() {
        let pool_config = config
            .environment
            .pool_config("cosmos-signing-dev", config.cosmos_signing_endpoints.clone());
        manager
            .add_cosmos_signing_pool(
                "cosmos-signing-dev",
                CosmosPoolConfig {
                    base: pool_config,
                    chain_id: config.cosmos_chain_id.clone(),
                    address_prefix: config.cosmos_address_prefix.clone(),
                    gas_price: None,
                },
            )
            .await?;
        info!("registered cosmos-signing-dev pool");
    }

    manager.start().await;

    let _metrics_exporter = init_metrics(config.metrics_port).await?;
    let _collector = MetricsCollector::install(
        &manager,
        Duration::from_secs(config.metrics_sample_interval_secs),
    );

    let stats_task = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let stats = manager.get_stats();
                info!(
                    ethereum_pools = stats.ethereum.len(),
                    cosmos_query_pools = stats.cosmos_query.len(),
                    cosmos_signing_pools = stats.cosmos_signing.len(),
                    "pool stats snapshot"
                );
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = stats_task => {
            if let Err(e) = result {
                error!(error = %e, "stats logging task panicked");
            }
        }
    }

    info!("shutting down gracefully");
    manager.stop().await;
    info!("connection pool dev server stopped");

    Ok(())
}
