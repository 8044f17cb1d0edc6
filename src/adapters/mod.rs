//! Protocol adapter trait and concrete implementations.
//!
//! A pool is generic over a capability set: `create`, `probe`, `close`. Concrete
//! adapters realize that set for a specific protocol family. The signing variant
//! of the Cosmos adapter extends the set with `create_with_wallet`.

pub mod cosmos_query;
pub mod cosmos_signing;
pub mod ethereum;

use std::time::Duration;

use async_trait::async_trait;

use crate::types::Endpoint;

/// Capability set a [`crate::pool::BasePool`] needs from a protocol adapter.
#[async_trait]
pub trait PoolAdapter: Send + Sync {
    /// The live client handle this adapter produces, e.g. an Ethereum JSON-RPC
    /// provider or a Cosmos query client. `Clone` lets the pool hand out a
    /// leased reference while keeping its own bookkeeping copy.
    type Client: Send + Sync + Clone;

    /// Build and verify a new client for `endpoint`. Implementations MUST perform
    /// the chain-id identity check against the configured network and return
    /// only verified clients.
    async fn create_client(&self, endpoint: &Endpoint, timeout: Duration) -> anyhow::Result<Self::Client>;

    /// Cheap liveness check. Returns `Ok(true)` for a healthy client, `Ok(false)`
    /// for a clean negative result, `Err` for a hard failure.
    async fn probe_client(&self, client: &Self::Client) -> anyhow::Result<bool>;

    /// Detach listeners and disconnect. Implementations swallow their own errors
    /// (log only) — teardown never fails the caller.
    async fn close_client(&self, client: Self::Client);

    /// Whether a pool using this adapter can be pre-warmed by calling
    /// `create_client` ahead of demand. Adapters whose clients require
    /// per-acquisition caller material (e.g. a wallet) override this to `false`;
    /// `create_client` on those adapters always fails, so pre-warming them would
    /// just spend `min_connections` worth of doomed calls at startup.
    fn prewarm_enabled(&self) -> bool {
        true
    }

    /// Whether plain `acquire()` can never succeed on this adapter because every
    /// client needs caller-supplied wallet material. `BasePool::acquire` checks
    /// this up front so misuse fails fast with [`crate::error::PoolError::WalletRequired`]
    /// instead of spending a round trip on a `create_client` call that is
    /// guaranteed to fail.
    fn requires_wallet(&self) -> bool {
        false
    }
}

/// Extension implemented by adapters whose clients must be constructed per
/// acquisition with caller-supplied signing material.
#[async_trait]
pub trait SigningAdapter: PoolAdapter {
    type Wallet: Send + Sync;

    async fn create_with_wallet(
        &self,
        endpoint: &Endpoint,
        wallet: Self::Wallet,
        timeout: Duration,
    ) -> anyhow::Result<Self::Client>;
}
