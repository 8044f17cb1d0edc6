//! Pool manager: a registry of named pools, one per network / chain id, with
//! scoped-acquisition helpers and an aggregate event/stats surface.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::adapters::cosmos_query::{CosmosQueryAdapter, CosmosQueryClient};
use crate::adapters::cosmos_signing::{CosmosSigningAdapter, CosmosSigningClient, CosmosWallet};
use crate::adapters::ethereum::{EthereumAdapter, EthereumClient};
use crate::adapters::PoolAdapter;
use crate::error::{PoolError, PoolResult};
use crate::events::{self, EventReceiver, EventSender, PoolEvent};
use crate::pool::{BasePool, ReleaseHandle};
use crate::types::{CosmosPoolConfig, EthereumPoolConfig, PoolConfig, PoolStats};

/// Releases a leased client when dropped, so a panic unwinding through the
/// caller's closure in `with_*_client` still honors the release contract
/// instead of leaking the lease (§4.3, §6). Also times the lease's lifetime for
/// the acquire-to-release request-duration histogram.
struct ScopedLease<A: PoolAdapter> {
    client: A::Client,
    release: ReleaseHandle<A>,
    pool_name: String,
    started_at: Instant,
}

impl<A: PoolAdapter> ScopedLease<A> {
    fn new(pool_name: String, client: A::Client, release: ReleaseHandle<A>) -> Self {
        Self {
            client,
            release,
            pool_name,
            started_at: Instant::now(),
        }
    }
}

impl<A: PoolAdapter> Drop for ScopedLease<A> {
    fn drop(&mut self) {
        self.release.release();
        histogram!(
            "connection_pool_request_duration_seconds",
            "pool" => self.pool_name.clone()
        )
        .record(self.started_at.elapsed().as_secs_f64());
    }
}

/// Rejects a config before any pool or adapter is built from it, so a typo in
/// an endpoint list or a swapped min/max fails registration instead of
/// surfacing later as a confusing capacity or selection error.
fn validate_pool_config(config: &PoolConfig) -> PoolResult<()> {
    if config.endpoints.is_empty() {
        return Err(PoolError::InvalidConfig(format!(
            "pool '{}' has no endpoints configured",
            config.name
        )));
    }
    if config.min_connections > config.max_connections {
        return Err(PoolError::InvalidConfig(format!(
            "pool '{}' has min_connections ({}) greater than max_connections ({})",
            config.name, config.min_connections, config.max_connections
        )));
    }
    Ok(())
}

/// Aggregate stats across every pool the manager owns.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub ethereum: HashMap<String, PoolStats>,
    pub cosmos_query: HashMap<String, PoolStats>,
    pub cosmos_signing: HashMap<String, PoolStats>,
}

/// Owns every pool in the process, keyed by network name / chain id.
pub struct PoolManager {
    ethereum: RwLock<HashMap<String, Arc<BasePool<EthereumAdapter>>>>,
    cosmos_query: RwLock<HashMap<String, Arc<BasePool<CosmosQueryAdapter>>>>,
    cosmos_signing: RwLock<HashMap<String, Arc<BasePool<CosmosSigningAdapter>>>>,
    running: AtomicBool,
    events_tx: EventSender,
}

impl PoolManager {
    pub fn new() -> Arc<Self> {
        let (events_tx, _rx) = events::channel();
        Arc::new(Self {
            ethereum: RwLock::new(HashMap::new()),
            cosmos_query: RwLock::new(HashMap::new()),
            cosmos_signing: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            events_tx,
        })
    }

    /// Subscribe to every pool's events, re-emitted onto one channel.
    pub fn subscribe(&self) -> EventReceiver {
        self.events_tx.subscribe()
    }

    fn relay_events<A>(self: &Arc<Self>, pool: &Arc<BasePool<A>>)
    where
        A: crate::adapters::PoolAdapter + 'static,
    {
        let mut rx = pool.subscribe();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Start the manager: every currently-registered pool is started. Pools added
    /// afterwards start immediately (see `add_*_pool`).
    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::Release);
        let pools: Vec<Arc<BasePool<EthereumAdapter>>> =
            self.ethereum.read().values().cloned().collect();
        for pool in pools {
            pool.start().await;
        }
        let pools: Vec<Arc<BasePool<CosmosQueryAdapter>>> =
            self.cosmos_query.read().values().cloned().collect();
        for pool in pools {
            pool.start().await;
        }
        let pools: Vec<Arc<BasePool<CosmosSigningAdapter>>> =
            self.cosmos_signing.read().values().cloned().collect();
        for pool in pools {
            pool.start().await;
        }
        info!("pool manager started");
        let _ = self
            .events_tx
            .send(PoolEvent::new(crate::events::PoolEventKind::PoolStarted, "manager"));
    }

    /// Stop every registered pool. Pools stay registered; `start` restarts them.
    pub async fn stop(self: &Arc<Self>) {
        self.running.store(false, Ordering::Release);
        let pools: Vec<Arc<BasePool<EthereumAdapter>>> =
            self.ethereum.read().values().cloned().collect();
        for pool in pools {
            pool.stop().await;
        }
        let pools: Vec<Arc<BasePool<CosmosQueryAdapter>>> =
            self.cosmos_query.read().values().cloned().collect();
        for pool in pools {
            pool.stop().await;
        }
        let pools: Vec<Arc<BasePool<CosmosSigningAdapter>>> =
            self.cosmos_signing.read().values().cloned().collect();
        for pool in pools {
            pool.stop().await;
        }
        info!("pool manager stopped");
        let _ = self
            .events_tx
            .send(PoolEvent::new(crate::events::PoolEventKind::PoolStopped, "manager"));
    }

    pub async fn add_ethereum_pool(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: EthereumPoolConfig,
    ) -> PoolResult<()> {
        let name = name.into();
        if self.ethereum.read().contains_key(&name) {
            return Err(PoolError::DuplicatePool(name));
        }
        validate_pool_config(&config.base)?;
        let adapter = EthereumAdapter::new(config.chain_id);
        let pool = BasePool::new(config.base, adapter);
        self.relay_events(&pool);
        if self.running.load(Ordering::Acquire) {
            pool.start().await;
        }
        self.ethereum.write().insert(name, pool);
        Ok(())
    }

    pub async fn add_cosmos_query_pool(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: CosmosPoolConfig,
    ) -> PoolResult<()> {
        let name = name.into();
        if self.cosmos_query.read().contains_key(&name) {
            return Err(PoolError::DuplicatePool(name));
        }
        validate_pool_config(&config.base)?;
        let adapter = CosmosQueryAdapter::new(config.chain_id);
        let pool = BasePool::new(config.base, adapter);
        self.relay_events(&pool);
        if self.running.load(Ordering::Acquire) {
            pool.start().await;
        }
        self.cosmos_query.write().insert(name, pool);
        Ok(())
    }

    pub async fn add_cosmos_signing_pool(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: CosmosPoolConfig,
    ) -> PoolResult<()> {
        let name = name.into();
        if self.cosmos_signing.read().contains_key(&name) {
            return Err(PoolError::DuplicatePool(name));
        }
        validate_pool_config(&config.base)?;
        let adapter = CosmosSigningAdapter::new(config.chain_id, config.address_prefix, config.gas_price);
        let pool = BasePool::new(config.base, adapter);
        self.relay_events(&pool);
        if self.running.load(Ordering::Acquire) {
            pool.start().await;
        }
        self.cosmos_signing.write().insert(name, pool);
        Ok(())
    }

    pub async fn remove_ethereum_pool(&self, name: &str) -> PoolResult<()> {
        let pool = self
            .ethereum
            .write()
            .remove(name)
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))?;
        pool.stop().await;
        Ok(())
    }

    pub async fn remove_cosmos_query_pool(&self, name: &str) -> PoolResult<()> {
        let pool = self
            .cosmos_query
            .write()
            .remove(name)
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))?;
        pool.stop().await;
        Ok(())
    }

    pub async fn remove_cosmos_signing_pool(&self, name: &str) -> PoolResult<()> {
        let pool = self
            .cosmos_signing
            .write()
            .remove(name)
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))?;
        pool.stop().await;
        Ok(())
    }

    fn get_ethereum_pool(&self, name: &str) -> PoolResult<Arc<BasePool<EthereumAdapter>>> {
        self.ethereum
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))
    }

    fn get_cosmos_query_pool(&self, name: &str) -> PoolResult<Arc<BasePool<CosmosQueryAdapter>>> {
        self.cosmos_query
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))
    }

    fn get_cosmos_signing_pool(&self, name: &str) -> PoolResult<Arc<BasePool<CosmosSigningAdapter>>> {
        self.cosmos_signing
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))
    }

    /// Acquire an Ethereum client for `name`, run `f`, and release on every exit
    /// path (including `f` returning an error or panicking during the await).
    pub async fn with_ethereum_client<F, Fut, R>(&self, name: &str, f: F) -> PoolResult<R>
    where
        F: FnOnce(EthereumClient) -> Fut,
        Fut: Future<Output = R>,
    {
        let pool = self.get_ethereum_pool(name)?;
        let (client, release) = pool.acquire().await?;
        let lease = ScopedLease::new(name.to_string(), client, release);
        Ok(f(lease.client.clone()).await)
    }

    pub async fn with_cosmos_query_client<F, Fut, R>(&self, name: &str, f: F) -> PoolResult<R>
    where
        F: FnOnce(CosmosQueryClient) -> Fut,
        Fut: Future<Output = R>,
    {
        let pool = self.get_cosmos_query_pool(name)?;
        let (client, release) = pool.acquire().await?;
        let lease = ScopedLease::new(name.to_string(), client, release);
        Ok(f(lease.client.clone()).await)
    }

    pub async fn with_cosmos_signing_client<F, Fut, R>(
        &self,
        name: &str,
        wallet: CosmosWallet,
        f: F,
    ) -> PoolResult<R>
    where
        F: FnOnce(CosmosSigningClient) -> Fut,
        Fut: Future<Output = R>,
    {
        let pool = self.get_cosmos_signing_pool(name)?;
        let (client, release) = pool.acquire_with_wallet(wallet).await?;
        let lease = ScopedLease::new(name.to_string(), client, release);
        Ok(f(lease.client.clone()).await)
    }

    pub fn get_stats(&self) -> ManagerStats {
        ManagerStats {
            ethereum: self
                .ethereum
                .read()
                .iter()
                .map(|(name, pool)| (name.clone(), pool.get_stats()))
                .collect(),
            cosmos_query: self
                .cosmos_query
                .read()
                .iter()
                .map(|(name, pool)| (name.clone(), pool.get_stats()))
                .collect(),
            cosmos_signing: self
                .cosmos_signing
                .read()
                .iter()
                .map(|(name, pool)| (name.clone(), pool.get_stats()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Endpoint, PoolConfig};

    #[tokio::test]
    async fn rejects_pool_with_no_endpoints() {
        let manager = PoolManager::new();
        let base = PoolConfig::new("eth-empty", vec![]);
        let config = EthereumPoolConfig {
            base,
            chain_id: None,
            throttle_limit: None,
            throttle_slot_interval_ms: None,
        };
        let result = manager.add_ethereum_pool("eth-empty", config).await;
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn rejects_pool_with_min_exceeding_max() {
        let manager = PoolManager::new();
        let mut base = PoolConfig::new("eth-bad-bounds", vec![Endpoint::new("http://a")]);
        base.min_connections = 5;
        base.max_connections = 1;
        let config = EthereumPoolConfig {
            base,
            chain_id: None,
            throttle_limit: None,
            throttle_slot_interval_ms: None,
        };
        let result = manager.add_ethereum_pool("eth-bad-bounds", config).await;
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }
}
