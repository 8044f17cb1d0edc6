//! Cosmos-style query-client adapter, backed by `tendermint_rpc::HttpClient`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tendermint_rpc::{Client, HttpClient};
use tracing::{debug, warn};

use crate::types::Endpoint;

use super::PoolAdapter;

/// Cosmos query client handle leased out by the pool.
pub type CosmosQueryClient = Arc<HttpClient>;

pub struct CosmosQueryAdapter {
    /// Expected chain id string, e.g. "osmosis-1".
    pub chain_id: String,
}

impl CosmosQueryAdapter {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
        }
    }

    fn check_chain_id(&self, observed: &str, endpoint: &str) -> anyhow::Result<()> {
        if observed != self.chain_id {
            return Err(anyhow!(
                "chain id mismatch for '{}': expected {}, got {}",
                endpoint,
                self.chain_id,
                observed
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PoolAdapter for CosmosQueryAdapter {
    type Client = CosmosQueryClient;

    async fn create_client(&self, endpoint: &Endpoint, timeout: Duration) -> anyhow::Result<Self::Client> {
        let client = HttpClient::new(endpoint.url.as_str())
            .with_context(|| format!("invalid endpoint url '{}'", endpoint.url))?;

        let status = tokio::time::timeout(timeout, client.status())
            .await
            .map_err(|_| anyhow!("connect timeout dialing '{}'", endpoint.url))?
            .with_context(|| format!("failed to fetch status from '{}'", endpoint.url))?;

        let observed = status.node_info.network.to_string();
        self.check_chain_id(&observed, &endpoint.url)?;

        debug!(endpoint = %endpoint.url, chain_id = %observed, "cosmos query client created");
        Ok(Arc::new(client))
    }

    async fn probe_client(&self, client: &Self::Client) -> anyhow::Result<bool> {
        let status_fut = client.status();
        let abci_fut = client.abci_info();

        let (status, abci) = tokio::join!(status_fut, abci_fut);

        let status = match status {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cosmos status probe failed");
                return Err(anyhow!(e));
            }
        };
        if let Err(e) = abci {
            warn!(error = %e, "cosmos abci_info probe failed");
            return Err(anyhow!(e));
        }

        let observed = status.node_info.network.to_string();
        if observed != self.chain_id {
            return Ok(false);
        }

        Ok(status.sync_info.latest_block_height.value() > 0)
    }

    async fn close_client(&self, _client: Self::Client) {
        // `HttpClient` holds no persistent connection to tear down.
    }
}
