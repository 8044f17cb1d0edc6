//! Ethereum-style JSON-RPC adapter, backed by `ethers::providers::Provider<Http>`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use tracing::{debug, warn};

use crate::types::Endpoint;

use super::PoolAdapter;

/// Ethereum client handle leased out by the pool.
pub type EthereumClient = Arc<Provider<Http>>;

pub struct EthereumAdapter {
    /// Expected chain id. When set, a mismatching remote is rejected at creation.
    pub chain_id: Option<u64>,
}

impl EthereumAdapter {
    pub fn new(chain_id: Option<u64>) -> Self {
        Self { chain_id }
    }
}

#[async_trait]
impl PoolAdapter for EthereumAdapter {
    type Client = EthereumClient;

    async fn create_client(&self, endpoint: &Endpoint, timeout: Duration) -> anyhow::Result<Self::Client> {
        let http = Http::new(
            endpoint
                .url
                .parse()
                .with_context(|| format!("invalid endpoint url '{}'", endpoint.url))?,
        );
        let provider = Provider::new(http).interval(Duration::from_millis(250));

        let observed = tokio::time::timeout(timeout, provider.get_chainid())
            .await
            .map_err(|_| anyhow!("connect timeout dialing '{}'", endpoint.url))?
            .with_context(|| format!("failed to fetch chain id from '{}'", endpoint.url))?;
        let observed: u64 = observed.as_u64();

        if let Some(expected) = self.chain_id {
            if observed != expected {
                return Err(anyhow!(
                    "chain id mismatch for '{}': expected {}, got {}",
                    endpoint.url,
                    expected,
                    observed
                ));
            }
        }

        debug!(endpoint = %endpoint.url, chain_id = observed, "ethereum client created");
        Ok(Arc::new(provider))
    }

    async fn probe_client(&self, client: &Self::Client) -> anyhow::Result<bool> {
        match client.get_block_number().await {
            Ok(height) => Ok(height.as_u64() > 0),
            Err(e) => {
                warn!(error = %e, "ethereum probe failed");
                Err(anyhow!(e))
            }
        }
    }

    async fn close_client(&self, _client: Self::Client) {
        // `Provider<Http>` holds no persistent connection or listener to tear
        // down; dropping the Arc is sufficient.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_carries_expected_chain_id() {
        let adapter = EthereumAdapter::new(Some(1));
        assert_eq!(adapter.chain_id, Some(1));
    }
}
