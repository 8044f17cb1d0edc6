//! Preset pool configurations and environment-driven application config.

use std::env;

use anyhow::{Context, Result};

use crate::types::{Endpoint, PoolConfig};

impl PoolConfig {
    /// Fast local iteration: small pool, short timeouts, a lenient breaker so a
    /// flaky local devnet node doesn't trip it on every restart.
    pub fn dev_preset(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        let mut cfg = PoolConfig::new(name, endpoints);
        cfg.max_connections = 5;
        cfg.min_connections = 1;
        cfg.connection_timeout_ms = 3_000;
        cfg.idle_timeout_ms = 60_000;
        cfg.health_check_interval_ms = 10_000;
        cfg.circuit_breaker_threshold = 10;
        cfg.circuit_breaker_timeout_ms = 10_000;
        cfg
    }

    /// Moderate pool sizing for shared testnets, where nodes are flakier than
    /// prod infra but traffic is still real.
    pub fn testnet_preset(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        let mut cfg = PoolConfig::new(name, endpoints);
        cfg.max_connections = 10;
        cfg.min_connections = 2;
        cfg.connection_timeout_ms = 5_000;
        cfg.idle_timeout_ms = 180_000;
        cfg.health_check_interval_ms = 20_000;
        cfg.circuit_breaker_threshold = 5;
        cfg.circuit_breaker_timeout_ms = 20_000;
        cfg
    }

    /// Conservative thresholds for mainnet relaying: trip the breaker fast, hold
    /// more idle connections so a retry never pays full dial latency.
    pub fn prod_preset(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        let mut cfg = PoolConfig::new(name, endpoints);
        cfg.max_connections = 20;
        cfg.min_connections = 4;
        cfg.connection_timeout_ms = 5_000;
        cfg.idle_timeout_ms = 300_000;
        cfg.health_check_interval_ms = 15_000;
        cfg.circuit_breaker_threshold = 3;
        cfg.circuit_breaker_timeout_ms = 30_000;
        cfg
    }
}

/// Deployment tier, selects which `PoolConfig` preset `AppConfig` builds pools with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Testnet,
    Prod,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "prod" | "production" | "mainnet" => Environment::Prod,
            "testnet" | "staging" => Environment::Testnet,
            _ => Environment::Dev,
        }
    }

    pub fn pool_config(self, name: impl Into<String>, endpoints: Vec<Endpoint>) -> PoolConfig {
        match self {
            Environment::Dev => PoolConfig::dev_preset(name, endpoints),
            Environment::Testnet => PoolConfig::testnet_preset(name, endpoints),
            Environment::Prod => PoolConfig::prod_preset(name, endpoints),
        }
    }
}

/// Bootstrap configuration for the dev-server binary, loaded from the
/// environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub metrics_port: u16,
    pub metrics_sample_interval_secs: u64,

    pub ethereum_chain_id: Option<u64>,
    pub ethereum_endpoints: Vec<Endpoint>,

    pub cosmos_chain_id: String,
    pub cosmos_address_prefix: String,
    pub cosmos_query_endpoints: Vec<Endpoint>,
    pub cosmos_signing_endpoints: Vec<Endpoint>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Environment::parse(&env::var("POOL_ENV").unwrap_or_else(|_| "dev".to_string()));

        Ok(Self {
            environment,

            metrics_port: env::var("METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .context("METRICS_PORT must be a u16")?,

            metrics_sample_interval_secs: env::var("METRICS_SAMPLE_INTERVAL_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("METRICS_SAMPLE_INTERVAL_SECS must be a u64")?,

            ethereum_chain_id: env::var("ETHEREUM_CHAIN_ID")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("ETHEREUM_CHAIN_ID must be a u64")?,

            ethereum_endpoints: parse_endpoints_env(
                &env::var("ETHEREUM_ENDPOINTS").unwrap_or_default(),
            ),

            cosmos_chain_id: env::var("COSMOS_CHAIN_ID").unwrap_or_else(|_| "osmosis-1".to_string()),
            cosmos_address_prefix: env::var("COSMOS_ADDRESS_PREFIX")
                .unwrap_or_else(|_| "osmo".to_string()),

            cosmos_query_endpoints: parse_endpoints_env(
                &env::var("COSMOS_QUERY_ENDPOINTS").unwrap_or_default(),
            ),
            cosmos_signing_endpoints: parse_endpoints_env(
                &env::var("COSMOS_SIGNING_ENDPOINTS").unwrap_or_default(),
            ),
        })
    }
}

/// Parses `url[::weight],url[::weight],...` into `Endpoint`s. Blank input
/// yields an empty list rather than an error; callers decide whether that's
/// fatal for the pool in question.
fn parse_endpoints_env(raw: &str) -> Vec<Endpoint> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once("::") {
            Some((url, weight)) => {
                let weight = weight.parse().unwrap_or(1);
                Endpoint::new(url).with_weight(weight)
            }
            None => Endpoint::new(entry),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_preset_is_lenient() {
        let cfg = PoolConfig::dev_preset("eth-dev", vec![Endpoint::new("http://localhost:8545")]);
        assert_eq!(cfg.circuit_breaker_threshold, 10);
        assert_eq!(cfg.min_connections, 1);
    }

    #[test]
    fn prod_preset_trips_faster_than_dev() {
        let dev = PoolConfig::dev_preset("eth", vec![Endpoint::new("http://a")]);
        let prod = PoolConfig::prod_preset("eth", vec![Endpoint::new("http://a")]);
        assert!(prod.circuit_breaker_threshold < dev.circuit_breaker_threshold);
    }

    #[test]
    fn parses_weighted_endpoint_list() {
        let endpoints = parse_endpoints_env("http://a::3, http://b, http://c::1");
        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints[0].weight, 3);
        assert_eq!(endpoints[1].weight, 1);
    }

    #[test]
    fn environment_parse_defaults_to_dev() {
        assert_eq!(Environment::parse("bogus"), Environment::Dev);
        assert_eq!(Environment::parse("PROD"), Environment::Prod);
    }
}
