//! Error taxonomy for the connection pool.

use thiserror::Error;

/// Errors surfaced by a [`crate::pool::BasePool`] or [`crate::manager::PoolManager`].
///
/// Each variant carries enough context (pool name, endpoint, chained cause) for a
/// caller to decide whether to retry, back off, or give up.
#[derive(Error, Debug)]
pub enum PoolError {
    /// `acquire` was called before `start` or after `stop`.
    #[error("pool '{pool}' is stopped")]
    PoolStopped { pool: String },

    /// Every configured endpoint is unhealthy. A circuit-open endpoint is not
    /// enough on its own to reach this variant: it's still selectable, and
    /// produces `CircuitBreakerOpen` if picked.
    #[error("pool '{pool}' has no healthy endpoints")]
    NoHealthyEndpoints { pool: String },

    /// The endpoint selected for this acquisition is inside its breaker open window.
    #[error("circuit breaker open for endpoint '{endpoint}' on pool '{pool}'")]
    CircuitBreakerOpen { pool: String, endpoint: String },

    /// The selected endpoint is at capacity and no alternative endpoint had room.
    #[error("capacity exhausted for endpoint '{endpoint}' on pool '{pool}'")]
    CapacityExhausted { pool: String, endpoint: String },

    /// Client construction failed (dial/handshake/chain-id mismatch/etc).
    #[error("failed to create client for endpoint '{endpoint}' on pool '{pool}': {source}")]
    ClientCreateFailed {
        pool: String,
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    /// No pool is registered under this network name / chain id.
    #[error("no pool registered for '{0}'")]
    PoolNotFound(String),

    /// A pool with this identifier is already registered.
    #[error("pool '{0}' already registered")]
    DuplicatePool(String),

    /// `acquire()` was called on a pool whose adapter only builds clients with
    /// caller-supplied wallet material; the caller needed `acquire_with_wallet`.
    #[error("pool '{pool}' requires a wallet per acquisition; use acquire_with_wallet")]
    WalletRequired { pool: String },

    /// A `PoolConfig` failed validation at registration time (e.g. no endpoints,
    /// or `min_connections` greater than `max_connections`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
