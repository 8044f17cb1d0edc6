//! Prometheus metrics surface.
//!
//! The pool and manager emit domain events and periodic stats snapshots; this
//! module is the sole place that turns those into a Prometheus exposition.
//! Counters tied to a single occurrence (connections created/destroyed, health
//! checks, breaker trips, errors) are driven off the event stream; gauges are
//! sampled from `PoolManager::get_stats()` on an interval; the request counter
//! and the two duration histograms are recorded at their natural call sites
//! (`BasePool::acquire`/`acquire_with_wallet` and the manager's scoped-lease
//! helpers) since those are the only places that know the outcome or the span
//! being timed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::task::JoinHandle;
use tracing::info;

use crate::events::PoolEventKind;
use crate::manager::PoolManager;

fn describe_all() {
    describe_gauge!(
        "connection_pool_connections_active",
        "Connections currently leased out of a pool"
    );
    describe_gauge!(
        "connection_pool_connections_idle",
        "Connections in a pool that are healthy and not leased"
    );
    describe_gauge!(
        "connection_pool_connections_total",
        "All connections tracked by a pool, leased or not"
    );
    describe_gauge!(
        "connection_pool_connections_failed",
        "Connections in a pool whose last probe marked them unhealthy"
    );
    describe_gauge!(
        "connection_pool_circuit_breaker_open",
        "1 if any endpoint's circuit breaker is open, else 0"
    );
    describe_gauge!(
        "connection_pool_average_latency_ms",
        "Average client-creation latency per pool"
    );
    describe_gauge!(
        "connection_pool_endpoint_healthy",
        "1 if an endpoint is healthy, else 0"
    );
    describe_gauge!(
        "connection_pool_endpoint_latency_seconds",
        "Last observed probe/creation latency for an endpoint"
    );
    describe_gauge!(
        "connection_pool_endpoint_circuit_breaker_open",
        "1 if an endpoint's circuit breaker is open, else 0"
    );
    describe_counter!(
        "connection_pool_requests_total",
        "Acquisitions attempted through acquire()/acquire_with_wallet(), labeled by status"
    );
    describe_counter!(
        "connection_pool_clients_created_total",
        "Clients built by an adapter's create_client/create_with_wallet"
    );
    describe_counter!(
        "connection_pool_clients_destroyed_total",
        "Clients closed via release-and-close or idle reaping"
    );
    describe_counter!(
        "connection_pool_health_checks_total",
        "Health probes run, labeled by result"
    );
    describe_counter!(
        "connection_pool_errors_total",
        "Errors observed on a pool's event stream"
    );
    describe_counter!(
        "connection_pool_circuit_breaker_trips_total",
        "Circuit breaker open/reset transitions"
    );
    describe_histogram!(
        "connection_pool_health_check_latency_seconds",
        "Latency observed by a health probe"
    );
    describe_histogram!(
        "connection_pool_client_creation_duration_seconds",
        "Time spent in create_client/create_with_wallet for a new client"
    );
    describe_histogram!(
        "connection_pool_request_duration_seconds",
        "Wall-clock time a caller held a leased client, acquire to release"
    );
}

/// Start the Prometheus HTTP exporter on `port` and register metric descriptions.
pub async fn init_metrics(port: u16) -> Result<JoinHandle<()>> {
    info!(port, "initializing connection pool metrics");
    describe_all();

    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("invalid metrics listen address")?;

    let handle = tokio::spawn(async move {
        let builder = PrometheusBuilder::new().with_http_listener(addr);
        if let Err(e) = builder.install() {
            tracing::error!(error = %e, "failed to start prometheus exporter");
        }
    });

    info!(port, "connection pool metrics exporter listening");
    Ok(handle)
}

/// Spawns the stats sampler and the event-reactive counters. Aborts both when
/// dropped, so holding the returned value keeps the collector alive.
pub struct MetricsCollector {
    sampler: JoinHandle<()>,
    reactor: JoinHandle<()>,
}

impl MetricsCollector {
    pub fn install(manager: &Arc<PoolManager>, sample_interval: Duration) -> Self {
        let sampler = {
            let manager = Arc::clone(manager);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sample_interval);
                loop {
                    ticker.tick().await;
                    let stats = manager.get_stats();
                    for (name, ps) in stats
                        .ethereum
                        .iter()
                        .chain(stats.cosmos_query.iter())
                        .chain(stats.cosmos_signing.iter())
                    {
                        gauge!("connection_pool_connections_active", "pool" => name.clone())
                            .set(ps.active_connections as f64);
                        gauge!("connection_pool_connections_idle", "pool" => name.clone())
                            .set(ps.idle_connections as f64);
                        gauge!("connection_pool_connections_total", "pool" => name.clone())
                            .set(ps.total_connections as f64);
                        gauge!("connection_pool_connections_failed", "pool" => name.clone())
                            .set(ps.failed_connections as f64);
                        gauge!("connection_pool_circuit_breaker_open", "pool" => name.clone())
                            .set(if ps.circuit_breaker_open { 1.0 } else { 0.0 });
                        gauge!("connection_pool_average_latency_ms", "pool" => name.clone())
                            .set(ps.average_latency);

                        for endpoint in &ps.endpoints {
                            gauge!(
                                "connection_pool_endpoint_healthy",
                                "pool" => name.clone(),
                                "endpoint" => endpoint.url.clone()
                            )
                            .set(if endpoint.is_healthy { 1.0 } else { 0.0 });
                            gauge!(
                                "connection_pool_endpoint_latency_seconds",
                                "pool" => name.clone(),
                                "endpoint" => endpoint.url.clone()
                            )
                            .set(endpoint.latency.unwrap_or(0.0) / 1000.0);
                            gauge!(
                                "connection_pool_endpoint_circuit_breaker_open",
                                "pool" => name.clone(),
                                "endpoint" => endpoint.url.clone()
                            )
                            .set(if endpoint.breaker_open { 1.0 } else { 0.0 });
                        }
                    }
                }
            })
        };

        let reactor = {
            let mut rx = manager.subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let pool = event.pool.clone();
                            match event.kind {
                                PoolEventKind::ConnectionCreated => {
                                    counter!("connection_pool_clients_created_total", "pool" => pool.clone())
                                        .increment(1);
                                    if let Some(data) = &event.data {
                                        if let Some(duration_ms) =
                                            data.get("duration_ms").and_then(|v| v.as_f64())
                                        {
                                            let endpoint = event.endpoint.clone().unwrap_or_default();
                                            histogram!(
                                                "connection_pool_client_creation_duration_seconds",
                                                "pool" => pool,
                                                "endpoint" => endpoint
                                            )
                                            .record(duration_ms / 1000.0);
                                        }
                                    }
                                }
                                PoolEventKind::ConnectionDestroyed => {
                                    counter!("connection_pool_clients_destroyed_total", "pool" => pool)
                                        .increment(1);
                                }
                                PoolEventKind::Error => {
                                    let endpoint = event.endpoint.clone().unwrap_or_default();
                                    counter!(
                                        "connection_pool_errors_total",
                                        "pool" => pool,
                                        "endpoint" => endpoint
                                    )
                                    .increment(1);
                                }
                                PoolEventKind::CircuitBreaker => {
                                    let endpoint = event.endpoint.clone().unwrap_or_default();
                                    counter!(
                                        "connection_pool_circuit_breaker_trips_total",
                                        "pool" => pool,
                                        "endpoint" => endpoint
                                    )
                                    .increment(1);
                                }
                                PoolEventKind::HealthCheck => {
                                    if let Some(data) = &event.data {
                                        let endpoint = event.endpoint.clone().unwrap_or_default();
                                        let healthy = data
                                            .get("healthy")
                                            .and_then(|v| v.as_bool())
                                            .unwrap_or(false);
                                        counter!(
                                            "connection_pool_health_checks_total",
                                            "pool" => pool.clone(),
                                            "result" => if healthy { "healthy" } else { "unhealthy" }
                                        )
                                        .increment(1);
                                        if let Some(latency_ms) =
                                            data.get("latency_ms").and_then(|v| v.as_f64())
                                        {
                                            histogram!(
                                                "connection_pool_health_check_latency_seconds",
                                                "pool" => pool,
                                                "endpoint" => endpoint
                                            )
                                            .record(latency_ms / 1000.0);
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        Self { sampler, reactor }
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        self.sampler.abort();
        self.reactor.abort();
    }
}
