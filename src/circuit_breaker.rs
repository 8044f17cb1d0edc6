//! Per-endpoint circuit breaker.
//!
//! Two states only — `Closed` and `Open` — with lazy-on-selection recovery. A
//! third `HalfOpen` probing state is a documented alternative this implementation
//! does not use; see `SPEC_FULL.md` §9.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

struct Inner {
    opened_at: Option<Instant>,
    error_count: u32,
}

/// Tracks consecutive creation/probe failures for one endpoint and gates
/// selection while the breaker is open.
pub struct CircuitBreaker {
    endpoint: String,
    threshold: u32,
    open_duration: Duration,
    open: AtomicBool,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, threshold: u32, open_duration: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            threshold: threshold.max(1),
            open_duration,
            open: AtomicBool::new(false),
            inner: RwLock::new(Inner {
                opened_at: None,
                error_count: 0,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> BreakerState {
        if self.open.load(Ordering::Acquire) {
            BreakerState::Open
        } else {
            BreakerState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u32 {
        self.inner.read().error_count
    }

    /// Whether enough time has elapsed since opening that the next selection
    /// attempt should reset the breaker (invariant 5 in the data model).
    pub fn ready_to_reset(&self) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.inner.read().opened_at {
            Some(opened_at) => opened_at.elapsed() >= self.open_duration,
            None => true,
        }
    }

    /// Clear the open flag and error count. Called from the selection path once
    /// `ready_to_reset` is true. Returns `true` if this call actually performed a
    /// transition (so the caller can emit a `circuit_breaker { reset }` event).
    pub fn reset(&self) -> bool {
        let mut inner = self.inner.write();
        let was_open = self.open.swap(false, Ordering::AcqRel);
        if was_open {
            inner.error_count = 0;
            inner.opened_at = None;
        }
        was_open
    }

    /// Record a creation failure or a failed probe. Returns `true` if this call
    /// caused a fresh Closed → Open transition.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.write();
        if self.open.load(Ordering::Acquire) {
            inner.error_count = inner.error_count.saturating_add(1);
            return false;
        }

        inner.error_count = inner.error_count.saturating_add(1);
        if inner.error_count >= self.threshold {
            inner.opened_at = Some(Instant::now());
            self.open.store(true, Ordering::Release);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_threshold() {
        let cb = CircuitBreaker::new("http://a", 3, Duration::from_secs(30));
        assert_eq!(cb.state(), BreakerState::Closed);

        assert!(!cb.record_failure());
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(!cb.record_failure());
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.record_failure());
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn stays_open_until_timeout_elapses() {
        let cb = CircuitBreaker::new("http://a", 1, Duration::from_millis(50));
        cb.record_failure();
        assert!(cb.is_open());
        assert!(!cb.ready_to_reset());

        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.ready_to_reset());
        assert!(cb.reset());
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.error_count(), 0);
    }

    #[test]
    fn reset_is_idempotent() {
        let cb = CircuitBreaker::new("http://a", 1, Duration::from_millis(10));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.reset());
        assert!(!cb.reset());
    }
}
