//! Per-destination circuit breaker.
//!
//! Opens after a burst of consecutive failures, bypasses the destination
//! while open, and lets a single probe through once the cool-down
//! elapses.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward the threshold.
    pub failure_window: Duration,
    /// How long the breaker stays open before permitting a probe.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            open_duration: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    first_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Breaker guarding one destination (an RPC endpoint, a host URL).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                first_failure_at: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a call to this destination may proceed right now.
    ///
    /// While open, returns `false` until the cool-down elapses; the first
    /// caller after that becomes the half-open probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed =
                    inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_duration {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    debug!("breaker {} half-open, probing", self.name);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                // One probe at a time
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!("breaker {} closed after successful probe", self.name);
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.first_failure_at = None;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                info!("breaker {} re-opened after failed probe", self.name);
            }
            BreakerState::Open => {}
            BreakerState::Closed => {
                let now = Instant::now();
                // Restart the count if the burst window expired
                match inner.first_failure_at {
                    Some(first) if now.duration_since(first) <= self.config.failure_window => {
                        inner.consecutive_failures += 1;
                    }
                    _ => {
                        inner.first_failure_at = Some(now);
                        inner.consecutive_failures = 1;
                    }
                }
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    info!(
                        "breaker {} opened after {} consecutive failures",
                        self.name, inner.consecutive_failures
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            open_duration: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let b = CircuitBreaker::new("rpc-0", fast_config());
        for _ in 0..4 {
            b.record_failure();
            assert_eq!(b.state(), BreakerState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn test_success_resets_count() {
        let b = CircuitBreaker::new("rpc-0", fast_config());
        for _ in 0..4 {
            b.record_failure();
        }
        b.record_success();
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_single_probe() {
        let b = CircuitBreaker::new("rpc-0", fast_config());
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(b.allow(), "first caller after cool-down becomes the probe");
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(!b.allow(), "second caller must wait for the probe outcome");
    }

    #[test]
    fn test_probe_success_closes() {
        let b = CircuitBreaker::new("rpc-0", fast_config());
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(b.allow());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let b = CircuitBreaker::new("rpc-0", fast_config());
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(b.allow());
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow());
    }
}
