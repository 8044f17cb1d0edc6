//! Typed pool events, published to a bounded broadcast channel.
//!
//! Modeled as a sum type rather than an emitter so the metrics collector (and any
//! other subscriber) gets compile-time coverage over the event set.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Default channel capacity. Lagging subscribers skip the oldest unread events
/// rather than block publishers; metrics snapshots re-sample the truth so this is
/// harmless.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEventKind {
    PoolStarted,
    PoolStopped,
    ConnectionCreated,
    ConnectionReleased,
    ConnectionDestroyed,
    HealthCheck,
    CircuitBreaker,
    Error,
}

/// One observable occurrence inside a pool, re-emitted verbatim by the manager.
#[derive(Debug, Clone, Serialize)]
pub struct PoolEvent {
    #[serde(rename = "type")]
    pub kind: PoolEventKind,
    pub pool: String,
    pub endpoint: Option<String>,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl PoolEvent {
    pub fn new(kind: PoolEventKind, pool: impl Into<String>) -> Self {
        Self {
            kind,
            pool: pool.into(),
            endpoint: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

pub type EventSender = tokio::sync::broadcast::Sender<PoolEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<PoolEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
