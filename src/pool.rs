//! Base pool: lifecycle, selection, breaker orchestration, health probing,
//! idle reaping, and stats for one named pool of one protocol family.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{PoolAdapter, SigningAdapter};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{PoolError, PoolResult};
use crate::events::{self, EventReceiver, EventSender, PoolEvent, PoolEventKind};
use crate::types::{Endpoint, EndpointHealth, EndpointStats, PoolConfig, PooledClient, PoolStats};

struct PoolState<C> {
    clients: HashMap<String, Vec<PooledClient<C>>>,
    health: HashMap<String, EndpointHealth>,
    /// In-flight `create_client` calls per endpoint, counted against its cap
    /// before the call starts so concurrent `acquire`s can't overbook it.
    reserved: HashMap<String, usize>,
}

impl<C> PoolState<C> {
    fn new(endpoints: &[Endpoint]) -> Self {
        let mut health = HashMap::new();
        let mut clients = HashMap::new();
        let mut reserved = HashMap::new();
        for endpoint in endpoints {
            health.insert(endpoint.url.clone(), EndpointHealth::new(&endpoint.url));
            clients.insert(endpoint.url.clone(), Vec::new());
            reserved.insert(endpoint.url.clone(), 0);
        }
        Self {
            clients,
            health,
            reserved,
        }
    }
}

enum ReleaseMode {
    /// Clear the in-use flag and leave the client in the pool for reuse.
    Reusable,
    /// Remove the client from the pool and close it (Cosmos signing clients).
    CloseOnRelease,
}

/// One-shot-safe release handle. Calling `release` more than once is a no-op;
/// the pool looks the client up by id and only acts if it is still marked in-use
/// (or, for signing clients, still present).
pub struct ReleaseHandle<A: PoolAdapter> {
    pool: Weak<BasePool<A>>,
    client_id: Uuid,
    endpoint_url: String,
    mode: ReleaseMode,
}

impl<A: PoolAdapter> Clone for ReleaseHandle<A> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            client_id: self.client_id,
            endpoint_url: self.endpoint_url.clone(),
            mode: match self.mode {
                ReleaseMode::Reusable => ReleaseMode::Reusable,
                ReleaseMode::CloseOnRelease => ReleaseMode::CloseOnRelease,
            },
        }
    }
}

impl<A: PoolAdapter> ReleaseHandle<A> {
    pub fn release(&self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        match self.mode {
            ReleaseMode::Reusable => pool.release_internal(&self.endpoint_url, self.client_id),
            ReleaseMode::CloseOnRelease => {
                pool.release_and_close(self.endpoint_url.clone(), self.client_id)
            }
        }
    }
}

enum AcquireOutcome {
    CapacityExhausted,
    CreateFailed(anyhow::Error),
}

/// Owns every `PooledClient` record for one named pool of one protocol family.
pub struct BasePool<A: PoolAdapter> {
    name: String,
    adapter: A,
    config: PoolConfig,
    endpoints: Vec<Endpoint>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    state: RwLock<PoolState<A::Client>>,
    requests_served: AtomicU64,
    total_latency_ms: Mutex<f64>,
    running: AtomicBool,
    events_tx: EventSender,
    timers: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl<A: PoolAdapter> BasePool<A> {
    pub fn new(config: PoolConfig, adapter: A) -> Arc<Self> {
        let breakers = config
            .endpoints
            .iter()
            .map(|e| {
                (
                    e.url.clone(),
                    Arc::new(CircuitBreaker::new(
                        e.url.clone(),
                        config.circuit_breaker_threshold,
                        config.circuit_breaker_timeout(),
                    )),
                )
            })
            .collect();

        let state = RwLock::new(PoolState::new(&config.endpoints));
        let (events_tx, _rx) = events::channel();
        let endpoints = config.endpoints.clone();

        Arc::new(Self {
            name: config.name.clone(),
            adapter,
            config,
            endpoints,
            breakers,
            state,
            requests_served: AtomicU64::new(0),
            total_latency_ms: Mutex::new(0.0),
            running: AtomicBool::new(false),
            events_tx,
            timers: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: PoolEvent) {
        let _ = self.events_tx.send(event);
    }

    fn record_latency(&self, d: Duration) {
        *self.total_latency_ms.lock() += d.as_secs_f64() * 1000.0;
    }

    /// Counts one `acquire`/`acquire_with_wallet` outcome, labeled by whether a
    /// client was actually handed back. Driven from the acquire path itself so a
    /// reused idle client is counted the same as a freshly created one (§4.4).
    fn record_request(&self, success: bool) {
        counter!(
            "connection_pool_requests_total",
            "pool" => self.name.clone(),
            "status" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    fn connect_timeout_for(&self, endpoint: &Endpoint) -> Duration {
        endpoint
            .connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.connect_timeout())
    }

    fn health_interval_for(&self, endpoint: &Endpoint) -> Duration {
        endpoint
            .health_check_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.health_check_interval())
    }

    /// Endpoints that are not known-unhealthy, per §4.1.1's candidate pool for
    /// weighted selection. Deliberately does NOT exclude circuit-open endpoints:
    /// weighted_pick must still be able to land on one, so `acquire` can raise
    /// `CircuitBreakerOpen` against the specific endpoint it selected (§8 S4)
    /// rather than silently routing around it.
    fn selectable_candidates(&self, excluded: &[String]) -> Vec<Endpoint> {
        let state = self.state.read();
        self.endpoints
            .iter()
            .filter(|e| !excluded.iter().any(|x| x == &e.url))
            .filter(|e| state.health.get(&e.url).map(|h| h.healthy).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Endpoints that are both healthy and not circuit-open, per §4.1.1's failover
    /// candidate pool. Breakers whose open window has elapsed are reset as a side
    /// effect of this call, per invariant 5.
    fn healthy_candidates(&self, excluded: &[String]) -> Vec<Endpoint> {
        let state = self.state.read();
        self.endpoints
            .iter()
            .filter(|e| !excluded.iter().any(|x| x == &e.url))
            .filter(|e| self.check_and_maybe_reset_breaker(e))
            .filter(|e| state.health.get(&e.url).map(|h| h.healthy).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// `true` if `endpoint`'s breaker is closed, or was open but has just been
    /// lazily reset because its open window elapsed (§4.1.3). `false` if it's
    /// still inside its open window.
    fn check_and_maybe_reset_breaker(&self, endpoint: &Endpoint) -> bool {
        let breaker = &self.breakers[&endpoint.url];
        if !breaker.is_open() {
            return true;
        }
        if breaker.ready_to_reset() {
            if breaker.reset() {
                self.emit(
                    PoolEvent::new(PoolEventKind::CircuitBreaker, &self.name)
                        .with_endpoint(endpoint.url.clone())
                        .with_data(json!({ "action": "reset" })),
                );
            }
            true
        } else {
            false
        }
    }

    /// Weighted round-robin keyed by the monotonic `requestsServed` counter (§4.1.1).
    fn weighted_pick(candidates: &[Endpoint], requests_served: u64) -> Endpoint {
        let total: u64 = candidates.iter().map(|e| e.weight as u64).sum();
        let target = if total == 0 { 0 } else { requests_served % total };
        let mut acc = 0u64;
        for e in candidates {
            acc += e.weight as u64;
            if acc > target {
                return e.clone();
            }
        }
        candidates
            .last()
            .cloned()
            .expect("candidates is non-empty when called")
    }

    fn record_breaker_failure(&self, endpoint: &Endpoint, error: &anyhow::Error) {
        {
            let mut state = self.state.write();
            state
                .health
                .entry(endpoint.url.clone())
                .or_insert_with(|| EndpointHealth::new(&endpoint.url))
                .record_creation_failure(error);
        }
        let tripped = self.breakers[&endpoint.url].record_failure();
        if tripped {
            warn!(pool = %self.name, endpoint = %endpoint.url, "circuit breaker opened");
            self.emit(
                PoolEvent::new(PoolEventKind::CircuitBreaker, &self.name)
                    .with_endpoint(endpoint.url.clone())
                    .with_data(json!({ "action": "opened" })),
            );
        }
        self.emit(
            PoolEvent::new(PoolEventKind::Error, &self.name)
                .with_endpoint(endpoint.url.clone())
                .with_data(json!({ "error": error.to_string() })),
        );
    }

    async fn try_acquire_on_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(A::Client, Uuid), AcquireOutcome> {
        // Step 1: reuse an idle, healthy client if one exists.
        {
            let mut state = self.state.write();
            if let Some(list) = state.clients.get_mut(&endpoint.url) {
                if let Some(pc) = list.iter_mut().find(|c| !c.in_use && c.healthy) {
                    pc.in_use = true;
                    pc.last_used_at = Instant::now();
                    return Ok((pc.client.clone(), pc.id));
                }
            }
        }

        // Step 2: create a new client if the endpoint has spare capacity. The
        // check-and-reserve happens under one write-lock critical section so two
        // concurrent acquires can't both observe spare capacity and overbook the
        // endpoint while `create_client` is awaited.
        let cap = self.config.effective_max_connections(endpoint) as usize;
        {
            let mut state = self.state.write();
            let current_count = state.clients.get(&endpoint.url).map(Vec::len).unwrap_or(0);
            let reserved = state.reserved.entry(endpoint.url.clone()).or_insert(0);
            if current_count + *reserved >= cap {
                return Err(AcquireOutcome::CapacityExhausted);
            }
            *reserved += 1;
        }

        let start = Instant::now();
        let result = self
            .adapter
            .create_client(endpoint, self.connect_timeout_for(endpoint))
            .await;

        {
            let mut state = self.state.write();
            if let Some(reserved) = state.reserved.get_mut(&endpoint.url) {
                *reserved = reserved.saturating_sub(1);
            }
        }

        match result {
            Ok(client) => {
                let elapsed = start.elapsed();
                self.record_latency(elapsed);
                let mut pc = PooledClient::new(client.clone(), endpoint.url.clone());
                pc.in_use = true;
                let id = pc.id;
                {
                    let mut state = self.state.write();
                    state.clients.entry(endpoint.url.clone()).or_default().push(pc);
                }
                self.emit(
                    PoolEvent::new(PoolEventKind::ConnectionCreated, &self.name)
                        .with_endpoint(endpoint.url.clone())
                        .with_data(json!({ "duration_ms": elapsed.as_secs_f64() * 1000.0 })),
                );
                Ok((client, id))
            }
            Err(e) => {
                self.record_breaker_failure(endpoint, &e);
                Err(AcquireOutcome::CreateFailed(e))
            }
        }
    }

    fn outcome_to_error(&self, endpoint: &Endpoint, outcome: AcquireOutcome) -> PoolError {
        match outcome {
            AcquireOutcome::CapacityExhausted => PoolError::CapacityExhausted {
                pool: self.name.clone(),
                endpoint: endpoint.url.clone(),
            },
            AcquireOutcome::CreateFailed(e) => PoolError::ClientCreateFailed {
                pool: self.name.clone(),
                endpoint: endpoint.url.clone(),
                source: e,
            },
        }
    }

    /// Select an endpoint and lease a client from it, failing over to one
    /// alternate endpoint with spare capacity per §4.1.2. Failover recurses
    /// exactly once: if the alternate is also at capacity, acquisition fails.
    pub async fn acquire(self: &Arc<Self>) -> PoolResult<(A::Client, ReleaseHandle<A>)> {
        let result = self.acquire_inner().await;
        self.record_request(result.is_ok());
        result
    }

    async fn acquire_inner(self: &Arc<Self>) -> PoolResult<(A::Client, ReleaseHandle<A>)> {
        if !self.is_running() {
            return Err(PoolError::PoolStopped {
                pool: self.name.clone(),
            });
        }

        if self.adapter.requires_wallet() {
            return Err(PoolError::WalletRequired {
                pool: self.name.clone(),
            });
        }

        let candidates = self.selectable_candidates(&[]);
        if candidates.is_empty() {
            return Err(PoolError::NoHealthyEndpoints {
                pool: self.name.clone(),
            });
        }

        let requests_served = self.requests_served.load(Ordering::Relaxed);
        let primary = Self::weighted_pick(&candidates, requests_served);

        if !self.check_and_maybe_reset_breaker(&primary) {
            return Err(PoolError::CircuitBreakerOpen {
                pool: self.name.clone(),
                endpoint: primary.url.clone(),
            });
        }

        match self.try_acquire_on_endpoint(&primary).await {
            Ok((client, client_id)) => {
                self.requests_served.fetch_add(1, Ordering::Relaxed);
                return Ok((client, self.lease_handle(client_id, &primary)));
            }
            Err(AcquireOutcome::CreateFailed(e)) => {
                return Err(self.outcome_to_error(&primary, AcquireOutcome::CreateFailed(e)));
            }
            Err(AcquireOutcome::CapacityExhausted) => {
                let alternates: Vec<Endpoint> = self.healthy_candidates(&[primary.url.clone()]);

                if alternates.is_empty() {
                    return Err(
                        self.outcome_to_error(&primary, AcquireOutcome::CapacityExhausted)
                    );
                }

                let alternate = Self::weighted_pick(&alternates, requests_served.wrapping_add(1));
                match self.try_acquire_on_endpoint(&alternate).await {
                    Ok((client, client_id)) => {
                        self.requests_served.fetch_add(1, Ordering::Relaxed);
                        Ok((client, self.lease_handle(client_id, &alternate)))
                    }
                    Err(outcome) => Err(self.outcome_to_error(&alternate, outcome)),
                }
            }
        }
    }

    fn lease_handle(self: &Arc<Self>, client_id: Uuid, endpoint: &Endpoint) -> ReleaseHandle<A> {
        ReleaseHandle {
            pool: Arc::downgrade(self),
            client_id,
            endpoint_url: endpoint.url.clone(),
            mode: ReleaseMode::Reusable,
        }
    }

    fn release_internal(&self, endpoint_url: &str, client_id: Uuid) {
        let released = {
            let mut state = self.state.write();
            match state.clients.get_mut(endpoint_url) {
                Some(list) => match list.iter_mut().find(|c| c.id == client_id) {
                    Some(pc) if pc.in_use => {
                        pc.in_use = false;
                        pc.last_used_at = Instant::now();
                        true
                    }
                    _ => false,
                },
                None => false,
            }
        };
        if released {
            self.emit(
                PoolEvent::new(PoolEventKind::ConnectionReleased, &self.name)
                    .with_endpoint(endpoint_url.to_string()),
            );
        }
    }

    fn release_and_close(self: &Arc<Self>, endpoint_url: String, client_id: Uuid) {
        let removed = {
            let mut state = self.state.write();
            state.clients.get_mut(&endpoint_url).and_then(|list| {
                let idx = list.iter().position(|c| c.id == client_id)?;
                Some(list.remove(idx))
            })
        };
        let Some(pc) = removed else {
            return; // already released: idempotent no-op
        };
        self.emit(
            PoolEvent::new(PoolEventKind::ConnectionReleased, &self.name)
                .with_endpoint(endpoint_url.clone()),
        );
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.adapter.close_client(pc.client).await;
            pool.emit(
                PoolEvent::new(PoolEventKind::ConnectionDestroyed, &pool.name)
                    .with_endpoint(endpoint_url),
            );
        });
    }

    /// Pre-warm, then start the health-probe and reap timers. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!(pool = %self.name, "start called on an already-running pool");
            return;
        }

        let endpoint_count = self.endpoints.len().max(1);
        let per_endpoint = self.config.min_connections as usize / endpoint_count;

        if per_endpoint > 0 && self.adapter.prewarm_enabled() {
            for endpoint in &self.endpoints {
                for _ in 0..per_endpoint {
                    let start = Instant::now();
                    match self
                        .adapter
                        .create_client(endpoint, self.connect_timeout_for(endpoint))
                        .await
                    {
                        Ok(client) => {
                            self.record_latency(start.elapsed());
                            let mut pc = PooledClient::new(client, endpoint.url.clone());
                            pc.in_use = false;
                            {
                                let mut state = self.state.write();
                                state.clients.entry(endpoint.url.clone()).or_default().push(pc);
                            }
                            self.emit(
                                PoolEvent::new(PoolEventKind::ConnectionCreated, &self.name)
                                    .with_endpoint(endpoint.url.clone()),
                            );
                        }
                        Err(e) => {
                            warn!(pool = %self.name, endpoint = %endpoint.url, error = %e, "prewarm creation failed");
                            self.record_breaker_failure(endpoint, &e);
                        }
                    }
                }
            }
        }

        self.spawn_timers();
        info!(pool = %self.name, "pool started");
        self.emit(PoolEvent::new(PoolEventKind::PoolStarted, &self.name));
    }

    fn spawn_timers(self: &Arc<Self>) {
        let health_pool = Arc::clone(self);
        let health_handle = tokio::spawn(async move {
            let mut last_probed: HashMap<String, Instant> = HashMap::new();
            let mut ticker = tokio::time::interval(health_pool.config.health_check_interval());
            loop {
                ticker.tick().await;
                for endpoint in health_pool.endpoints.clone() {
                    let interval = health_pool.health_interval_for(&endpoint);
                    let due = last_probed
                        .get(&endpoint.url)
                        .map(|t| t.elapsed() >= interval)
                        .unwrap_or(true);
                    if due {
                        health_pool.health_check_one(&endpoint).await;
                        last_probed.insert(endpoint.url.clone(), Instant::now());
                    }
                }
            }
        });

        let reap_pool = Arc::clone(self);
        let reap_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reap_pool.config.reap_period());
            loop {
                ticker.tick().await;
                reap_pool.reap_once().await;
            }
        });

        *self.timers.lock() = Some((health_handle, reap_handle));
    }

    async fn health_check_one(&self, endpoint: &Endpoint) {
        let existing = {
            let state = self.state.read();
            state
                .clients
                .get(&endpoint.url)
                .and_then(|list| list.iter().find(|c| !c.in_use).map(|c| (c.id, c.client.clone())))
        };

        let (client, reused_id) = match existing {
            Some((id, c)) => (c, Some(id)),
            None => match self
                .adapter
                .create_client(endpoint, self.connect_timeout_for(endpoint))
                .await
            {
                Ok(c) => (c, None),
                Err(e) => {
                    self.record_breaker_failure(endpoint, &e);
                    // Unlike an `acquire()`-path creation failure, this happened while
                    // probing for liveness: treat it the same as a failed probe so
                    // `EndpointHealth.healthy` reflects it, not just the breaker.
                    self.state
                        .write()
                        .health
                        .entry(endpoint.url.clone())
                        .or_insert_with(|| EndpointHealth::new(&endpoint.url))
                        .healthy = false;
                    return;
                }
            },
        };

        let start = Instant::now();
        let result = self.adapter.probe_client(&client).await;
        let elapsed = start.elapsed();

        if reused_id.is_none() {
            self.adapter.close_client(client).await;
        }

        let healthy = matches!(result, Ok(true));
        {
            let mut state = self.state.write();
            let health = state
                .health
                .entry(endpoint.url.clone())
                .or_insert_with(|| EndpointHealth::new(&endpoint.url));
            match &result {
                Ok(true) => health.record_success(elapsed),
                Ok(false) => health.record_failure("probe returned unhealthy"),
                Err(e) => health.record_failure(e),
            }

            if let Some(id) = reused_id {
                if let Some(pc) = state
                    .clients
                    .get_mut(&endpoint.url)
                    .and_then(|list| list.iter_mut().find(|c| c.id == id))
                {
                    pc.healthy = healthy;
                }
            }
        }

        if !healthy {
            let tripped = self.breakers[&endpoint.url].record_failure();
            if tripped {
                self.emit(
                    PoolEvent::new(PoolEventKind::CircuitBreaker, &self.name)
                        .with_endpoint(endpoint.url.clone())
                        .with_data(json!({ "action": "opened" })),
                );
            }
        }

        debug!(pool = %self.name, endpoint = %endpoint.url, healthy, latency_ms = elapsed.as_secs_f64() * 1000.0, "health check");
        self.emit(
            PoolEvent::new(PoolEventKind::HealthCheck, &self.name)
                .with_endpoint(endpoint.url.clone())
                .with_data(json!({ "healthy": healthy, "latency_ms": elapsed.as_secs_f64() * 1000.0 })),
        );
    }

    async fn reap_once(&self) {
        let idle_timeout = self.config.idle_timeout();
        let mut reaped: Vec<(String, A::Client)> = Vec::new();

        {
            let mut state = self.state.write();
            for (url, list) in state.clients.iter_mut() {
                let mut i = 0;
                while i < list.len() {
                    if !list[i].in_use && list[i].idle_for() > idle_timeout {
                        let pc = list.remove(i);
                        reaped.push((url.clone(), pc.client));
                    } else {
                        i += 1;
                    }
                }
            }
        }

        for (url, client) in reaped {
            self.adapter.close_client(client).await;
            debug!(pool = %self.name, endpoint = %url, "reaped idle client");
            self.emit(
                PoolEvent::new(PoolEventKind::ConnectionDestroyed, &self.name).with_endpoint(url),
            );
        }
    }

    /// Stop timers, then close every client on every endpoint, best-effort.
    /// Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some((health, reap)) = self.timers.lock().take() {
            health.abort();
            reap.abort();
        }

        let clients: Vec<A::Client> = {
            let mut state = self.state.write();
            let mut all = Vec::new();
            for (_, list) in state.clients.iter_mut() {
                for pc in list.drain(..) {
                    all.push(pc.client);
                }
            }
            all
        };

        futures::future::join_all(clients.into_iter().map(|c| self.adapter.close_client(c))).await;

        info!(pool = %self.name, "pool stopped");
        self.emit(PoolEvent::new(PoolEventKind::PoolStopped, &self.name));
    }

    pub fn get_stats(&self) -> PoolStats {
        let state = self.state.read();
        let mut total = 0usize;
        let mut active = 0usize;
        let mut idle = 0usize;
        let mut failed = 0usize;
        let mut endpoints = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            if let Some(list) = state.clients.get(&endpoint.url) {
                total += list.len();
                for c in list {
                    if c.in_use {
                        active += 1;
                    } else if c.healthy {
                        idle += 1;
                    } else {
                        failed += 1;
                    }
                }
            }

            let health = state.health.get(&endpoint.url);
            endpoints.push(EndpointStats {
                url: endpoint.url.clone(),
                is_healthy: health.map(|h| h.healthy).unwrap_or(true),
                latency: health.and_then(|h| h.latency_ms),
                last_check_secs_ago: health
                    .and_then(|h| h.last_check)
                    .map(|t| t.elapsed().as_secs_f64()),
                error_count: health.map(|h| h.error_count).unwrap_or(0),
                last_error: health.and_then(|h| h.last_error.clone()),
                breaker_open: self.breakers[&endpoint.url].is_open(),
            });
        }

        let requests_served = self.requests_served.load(Ordering::Relaxed);
        let total_latency = *self.total_latency_ms.lock();
        let average_latency = if requests_served > 0 {
            total_latency / requests_served as f64
        } else {
            0.0
        };

        PoolStats {
            name: self.name.clone(),
            total_connections: total,
            active_connections: active,
            idle_connections: idle,
            failed_connections: failed,
            requests_served,
            average_latency,
            circuit_breaker_open: self.breakers.values().any(|b| b.is_open()),
            endpoints,
        }
    }
}

impl<A: SigningAdapter> BasePool<A> {
    /// Acquire a signing client built fresh for `wallet`. Unlike `acquire`, the
    /// resulting client is never reused across wallets: release closes it.
    pub async fn acquire_with_wallet(
        self: &Arc<Self>,
        wallet: A::Wallet,
    ) -> PoolResult<(A::Client, ReleaseHandle<A>)> {
        let result = self.acquire_with_wallet_inner(wallet).await;
        self.record_request(result.is_ok());
        result
    }

    async fn acquire_with_wallet_inner(
        self: &Arc<Self>,
        wallet: A::Wallet,
    ) -> PoolResult<(A::Client, ReleaseHandle<A>)> {
        if !self.is_running() {
            return Err(PoolError::PoolStopped {
                pool: self.name.clone(),
            });
        }

        let candidates = self.selectable_candidates(&[]);
        if candidates.is_empty() {
            return Err(PoolError::NoHealthyEndpoints {
                pool: self.name.clone(),
            });
        }

        let requests_served = self.requests_served.load(Ordering::Relaxed);
        let endpoint = Self::weighted_pick(&candidates, requests_served);

        if !self.check_and_maybe_reset_breaker(&endpoint) {
            return Err(PoolError::CircuitBreakerOpen {
                pool: self.name.clone(),
                endpoint: endpoint.url.clone(),
            });
        }

        let start = Instant::now();
        match self
            .adapter
            .create_with_wallet(&endpoint, wallet, self.connect_timeout_for(&endpoint))
            .await
        {
            Ok(client) => {
                let elapsed = start.elapsed();
                self.record_latency(elapsed);
                self.requests_served.fetch_add(1, Ordering::Relaxed);
                let mut pc = PooledClient::new(client.clone(), endpoint.url.clone());
                pc.in_use = true;
                let client_id = pc.id;
                {
                    let mut state = self.state.write();
                    state.clients.entry(endpoint.url.clone()).or_default().push(pc);
                }
                self.emit(
                    PoolEvent::new(PoolEventKind::ConnectionCreated, &self.name)
                        .with_endpoint(endpoint.url.clone())
                        .with_data(json!({ "duration_ms": elapsed.as_secs_f64() * 1000.0 })),
                );
                let handle = ReleaseHandle {
                    pool: Arc::downgrade(self),
                    client_id,
                    endpoint_url: endpoint.url.clone(),
                    mode: ReleaseMode::CloseOnRelease,
                };
                Ok((client, handle))
            }
            Err(e) => {
                self.record_breaker_failure(&endpoint, &e);
                Err(PoolError::ClientCreateFailed {
                    pool: self.name.clone(),
                    endpoint: endpoint.url.clone(),
                    source: e,
                })
            }
        }
    }
}
