//! Cosmos signing-client adapter.
//!
//! Signing clients are created per acquisition with caller-supplied wallet
//! material; they are not pooled across wallets (§4.2). A plain `create_client`
//! without a wallet is a programmer error and fails loudly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use cosmrs::crypto::secp256k1::SigningKey;
use cosmrs::AccountId;
use tendermint_rpc::{Client, HttpClient};
use tracing::{debug, warn};

use crate::types::Endpoint;

use super::{PoolAdapter, SigningAdapter};

/// A wallet the caller supplies per acquisition. Wraps a signing key and the
/// bech32 account it derives to under the pool's configured address prefix.
#[derive(Clone)]
pub struct CosmosWallet {
    signing_key: Arc<SigningKey>,
    account_id: AccountId,
}

impl CosmosWallet {
    pub fn from_signing_key(signing_key: SigningKey, address_prefix: &str) -> anyhow::Result<Self> {
        let account_id = signing_key
            .public_key()
            .account_id(address_prefix)
            .map_err(|e| anyhow!("failed to derive account id: {e}"))?;
        Ok(Self {
            signing_key: Arc::new(signing_key),
            account_id,
        })
    }

    /// A signing wallet always carries exactly one derived account in this
    /// implementation; the accessor still returns a slice so callers can treat
    /// multi-account wallets uniformly if that support is added later.
    pub fn accounts(&self) -> &[AccountId] {
        std::slice::from_ref(&self.account_id)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// Cosmos signing client handle leased out by the pool. Cloning is cheap
/// (`tendermint_rpc::HttpClient` wraps a shared `reqwest::Client`); it exists to
/// satisfy `PoolAdapter::Client: Clone`, not to share a client across wallets.
#[derive(Clone)]
pub struct CosmosSigningClient {
    pub rpc: HttpClient,
    pub wallet: CosmosWallet,
    pub gas_price: Option<String>,
}

pub struct CosmosSigningAdapter {
    pub chain_id: String,
    pub address_prefix: String,
    pub gas_price: Option<String>,
}

impl CosmosSigningAdapter {
    pub fn new(chain_id: impl Into<String>, address_prefix: impl Into<String>, gas_price: Option<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            address_prefix: address_prefix.into(),
            gas_price,
        }
    }
}

/// Minimal hand-rolled protobuf encoding of `cosmos.auth.v1beta1.QueryAccountRequest`
/// (a single `string address = 1` field), used to probe account existence over the
/// tendermint ABCI query path the Cosmos SDK's gRPC query router also answers.
fn encode_account_request(address: &str) -> Vec<u8> {
    let bytes = address.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(0x0a); // field 1, wire type 2 (length-delimited)
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    out
}

async fn verify_account_fetchable(rpc: &HttpClient, account: &AccountId, timeout: Duration) -> anyhow::Result<()> {
    let query = encode_account_request(&account.to_string());
    let response = tokio::time::timeout(
        timeout,
        rpc.abci_query(
            Some("/cosmos.auth.v1beta1.Query/Account".to_string()),
            query,
            None,
            false,
        ),
    )
    .await
    .map_err(|_| anyhow!("timed out fetching account '{}'", account))?
    .with_context(|| format!("abci query failed for account '{account}'"))?;

    if response.value.is_empty() {
        bail!("account '{}' not found on chain", account);
    }
    Ok(())
}

#[async_trait]
impl PoolAdapter for CosmosSigningAdapter {
    type Client = CosmosSigningClient;

    async fn create_client(&self, endpoint: &Endpoint, _timeout: Duration) -> anyhow::Result<Self::Client> {
        bail!(
            "signing client for '{}' requires a wallet; use create_with_wallet",
            endpoint.url
        )
    }

    async fn probe_client(&self, client: &Self::Client) -> anyhow::Result<bool> {
        let status = match client.rpc.status().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cosmos signing status probe failed");
                return Err(anyhow!(e));
            }
        };
        if status.node_info.network.to_string() != self.chain_id {
            return Ok(false);
        }

        let account = &client.wallet.accounts()[0];
        match verify_account_fetchable(&client.rpc, account, Duration::from_secs(5)).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "cosmos wallet account probe failed");
                Ok(false)
            }
        }
    }

    async fn close_client(&self, _client: Self::Client) {
        // No persistent connection or listener to tear down.
    }

    fn prewarm_enabled(&self) -> bool {
        false
    }

    fn requires_wallet(&self) -> bool {
        true
    }
}

#[async_trait]
impl SigningAdapter for CosmosSigningAdapter {
    type Wallet = CosmosWallet;

    async fn create_with_wallet(
        &self,
        endpoint: &Endpoint,
        wallet: Self::Wallet,
        timeout: Duration,
    ) -> anyhow::Result<Self::Client> {
        if wallet.accounts().is_empty() {
            bail!("wallet for '{}' has no accounts", endpoint.url);
        }

        let rpc = HttpClient::new(endpoint.url.as_str())
            .with_context(|| format!("invalid endpoint url '{}'", endpoint.url))?;

        let status = tokio::time::timeout(timeout, rpc.status())
            .await
            .map_err(|_| anyhow!("connect timeout dialing '{}'", endpoint.url))?
            .with_context(|| format!("failed to fetch status from '{}'", endpoint.url))?;

        let observed = status.node_info.network.to_string();
        if observed != self.chain_id {
            bail!(
                "chain id mismatch for '{}': expected {}, got {}",
                endpoint.url,
                self.chain_id,
                observed
            );
        }

        let first_account = &wallet.accounts()[0];
        verify_account_fetchable(&rpc, first_account, timeout).await?;

        debug!(endpoint = %endpoint.url, account = %first_account, "cosmos signing client created");
        Ok(CosmosSigningClient {
            rpc,
            wallet,
            gas_price: self.gas_price.clone(),
        })
    }
}
