//! Configuration and record types shared by every pool variant.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Address of one remote RPC node, immutable for the lifetime of the pool that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    /// Identity of the endpoint; also the cache/registry key.
    pub url: String,

    /// Relative weight used by weighted round-robin selection. Must be >= 1.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Per-endpoint override of the pool-wide client cap.
    #[serde(default)]
    pub max_connections: Option<u32>,

    /// Connect timeout override; falls back to the pool-wide value when absent.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Health-probe interval override; falls back to the pool-wide value when absent.
    #[serde(default)]
    pub health_check_interval_ms: Option<u64>,
}

fn default_weight() -> u32 {
    1
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            weight: 1,
            max_connections: None,
            connect_timeout_ms: None,
            health_check_interval_ms: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }
}

/// Pool-wide configuration, independent of protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub name: String,
    pub endpoints: Vec<Endpoint>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_circuit_breaker_timeout_ms")]
    pub circuit_breaker_timeout_ms: u64,

    /// Informational only; the base pool does not wire a retry loop around these.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    0
}
fn default_connection_timeout_ms() -> u64 {
    5_000
}
fn default_idle_timeout_ms() -> u64 {
    300_000
}
fn default_health_check_interval_ms() -> u64 {
    30_000
}
fn default_circuit_breaker_threshold() -> u32 {
    5
}
fn default_circuit_breaker_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            name: name.into(),
            endpoints,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_ms: default_circuit_breaker_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }

    /// Reap ticks at twice the idle-timeout frequency, so a client is never
    /// idle for much longer than its configured timeout before being swept.
    pub fn reap_period(&self) -> Duration {
        self.idle_timeout() / 2
    }

    /// Effective max connections for a single endpoint: its own override, else the
    /// pool-wide cap.
    pub fn effective_max_connections(&self, endpoint: &Endpoint) -> u32 {
        endpoint.max_connections.unwrap_or(self.max_connections)
    }
}

/// Ethereum-specific pool configuration.
///
/// Note: `deny_unknown_fields` is not applicable here because of the flattened
/// `base` field (serde cannot combine the two); `PoolConfig` itself still denies
/// unknown keys for the fields it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumPoolConfig {
    #[serde(flatten)]
    pub base: PoolConfig,

    /// Expected chain id. When set, any freshly built client reporting a
    /// different chain id is rejected.
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default)]
    pub throttle_limit: Option<u32>,
    #[serde(default)]
    pub throttle_slot_interval_ms: Option<u64>,
}

/// Cosmos-specific pool configuration, shared by the query and signing variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosmosPoolConfig {
    #[serde(flatten)]
    pub base: PoolConfig,

    pub chain_id: String,
    pub address_prefix: String,

    #[serde(default)]
    pub gas_price: Option<String>,
}

/// Per-endpoint health record maintained by the base pool.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub url: String,
    pub healthy: bool,
    pub latency_ms: Option<f64>,
    #[serde(skip)]
    pub last_check: Option<Instant>,
    pub error_count: u32,
    pub last_error: Option<String>,
}

impl EndpointHealth {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            healthy: true,
            latency_ms: None,
            last_check: None,
            error_count: 0,
            last_error: None,
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.healthy = true;
        self.latency_ms = Some(latency.as_secs_f64() * 1000.0);
        self.last_check = Some(Instant::now());
        self.error_count = self.error_count.saturating_sub(1);
    }

    pub fn record_failure(&mut self, error: impl ToString) {
        self.healthy = false;
        self.last_check = Some(Instant::now());
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.to_string());
    }

    /// Record a client-creation failure without flipping `healthy`. Gating
    /// acquisitions on repeated creation failures is the circuit breaker's job;
    /// this only keeps the diagnostic fields (error count, last error) current so
    /// `healthy` continues to reflect probe results per §4.1.3.
    pub fn record_creation_failure(&mut self, error: impl ToString) {
        self.last_check = Some(Instant::now());
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.to_string());
    }
}

/// The ownership unit: a live client handle plus pool-managed bookkeeping.
///
/// Exclusively owned by the pool that created it; callers are handed a lease, not
/// the record itself.
pub struct PooledClient<T> {
    pub id: uuid::Uuid,
    pub client: T,
    pub endpoint_url: String,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub in_use: bool,
    pub healthy: bool,

    /// Ethereum only: chain id observed at creation.
    pub observed_chain_id: Option<u64>,
}

impl<T> PooledClient<T> {
    pub fn new(client: T, endpoint_url: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4(),
            client,
            endpoint_url: endpoint_url.into(),
            created_at: now,
            last_used_at: now,
            in_use: false,
            healthy: true,
            observed_chain_id: None,
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }
}

/// Snapshot of one endpoint's health, shaped per the stats-endpoint JSON projection.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub url: String,
    pub is_healthy: bool,
    pub latency: Option<f64>,
    /// Seconds since the last health probe completed, if one ever has.
    pub last_check_secs_ago: Option<f64>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub breaker_open: bool,
}

/// Snapshot returned by `BasePool::get_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub failed_connections: usize,
    pub requests_served: u64,
    pub average_latency: f64,
    pub circuit_breaker_open: bool,
    pub endpoints: Vec<EndpointStats>,
}
