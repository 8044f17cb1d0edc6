//! Generic multi-protocol RPC connection pool for the cross-chain atomic-swap
//! relayer: weighted round-robin selection, per-endpoint circuit breakers,
//! background health probing, idle reaping, and a manager that keys pools by
//! network name / chain id.
//!
//! The library never installs a global `tracing` subscriber or starts the
//! Prometheus exporter itself — both are the hosting binary's responsibility
//! (see `src/bin/dev-server.rs`).

pub mod adapters;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod types;

pub use adapters::cosmos_query::{CosmosQueryAdapter, CosmosQueryClient};
pub use adapters::cosmos_signing::{CosmosSigningAdapter, CosmosSigningClient, CosmosWallet};
pub use adapters::ethereum::{EthereumAdapter, EthereumClient};
pub use adapters::{PoolAdapter, SigningAdapter};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use config::{AppConfig, Environment};
pub use error::{PoolError, PoolResult};
pub use events::{PoolEvent, PoolEventKind};
pub use manager::{ManagerStats, PoolManager};
pub use metrics::MetricsCollector;
pub use pool::{BasePool, ReleaseHandle};
pub use types::{
    CosmosPoolConfig, Endpoint, EndpointHealth, EndpointStats, EthereumPoolConfig, PoolConfig,
    PoolStats,
};
