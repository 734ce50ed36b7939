// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Consecutive-failure circuit breaker.
//!
//! Protects the search backend from being hammered while it is down.
//! Callers ask for a [`CallPermit`] and report the result on it; consecutive
//! failures "trip" the breaker once the threshold is reached.
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Backend unhealthy, requests fail-fast without attempting
//! - HalfOpen: Cooldown elapsed, exactly one trial request is in flight
//!
//! A trial that succeeds closes the circuit; a trial that fails re-opens it
//! for another full cooldown.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::EntryWriter;
use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};

/// Circuit breaker state for metrics/monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Number of consecutive failures to trip the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Fast recovery for testing
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A named circuit breaker; transitions are exported as metrics
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<BreakerState>,
}

/// Admission to call through the breaker.
///
/// Report the result with [`CallPermit::success`] or [`CallPermit::failure`].
/// Dropping the permit unreported counts as a failure, so an abandoned
/// half-open trial cannot leave the breaker stuck.
#[must_use]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    reported: bool,
}

impl CallPermit<'_> {
    /// Whether this permit is the single half-open trial
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_result(true, self.trial);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_result(false, self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_result(false, self.trial);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and config
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Get current circuit state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask for admission. `None` means the call must fail fast.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.inner.lock();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if !cooled {
                    drop(inner);
                    self.reject();
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                info!(circuit = %self.name, "Circuit breaker half-open, allowing trial call");
                crate::metrics::set_circuit_state(&self.name, CircuitState::HalfOpen as u8);
                true
            }
            // Trial already in flight
            CircuitState::HalfOpen => {
                drop(inner);
                self.reject();
                return None;
            }
        };

        Some(CallPermit {
            breaker: self,
            trial,
            reported: false,
        })
    }

    fn reject(&self) {
        debug!(circuit = %self.name, "Circuit breaker rejected call (open)");
        crate::metrics::record_circuit_call(&self.name, "rejected");
    }

    fn on_result(&self, success: bool, trial: bool) {
        let result = if success { "success" } else { "failure" };
        crate::metrics::record_circuit_call(&self.name, result);

        let mut inner = self.inner.lock();
        let before = inner.state;

        match (inner.state, trial, success) {
            (CircuitState::HalfOpen, true, true) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
            (CircuitState::HalfOpen, true, false) => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            (CircuitState::Closed, _, true) => inner.consecutive_failures = 0,
            (CircuitState::Closed, _, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            // Late result of a call admitted before the circuit tripped
            _ => {}
        }

        let after = inner.state;
        let failures = inner.consecutive_failures;
        drop(inner);

        if before != after {
            match after {
                CircuitState::Open => warn!(
                    circuit = %self.name,
                    consecutive_failures = failures,
                    cooldown = ?self.config.recovery_timeout,
                    "Circuit breaker opened"
                ),
                _ => info!(circuit = %self.name, state = %after, "Circuit breaker state changed"),
            }
            crate::metrics::set_circuit_state(&self.name, after as u8);
        }
    }
}

/// Circuit breaker decorator around an [`EntryWriter`].
///
/// A write counts as a failure when it errors or returns a failed outcome.
/// While open, writes return [`DeliveryError::CircuitOpen`] without reaching
/// the wrapped writer.
pub struct CircuitBreakerLayer<W> {
    inner: W,
    breaker: CircuitBreaker,
}

impl<W: EntryWriter> CircuitBreakerLayer<W> {
    pub fn new(inner: W, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<W: EntryWriter> EntryWriter for CircuitBreakerLayer<W> {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
        let permit = self.breaker.try_acquire().ok_or(DeliveryError::CircuitOpen)?;

        let result = self.inner.write(entry).await;
        match &result {
            Ok(outcome) if outcome.is_success() => permit.success(),
            _ => permit.failure(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::log_entry::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn trip(cb: &CircuitBreaker) {
        for _ in 0..cb.config().failure_threshold {
            cb.try_acquire().expect("closed circuit admits calls").failure();
        }
    }

    struct CountingWriter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EntryWriter for CountingWriter {
        async fn write(&self, _entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DeliveryError::Unavailable("boom".into()))
            } else {
                Ok(WriteOutcome::success())
            }
        }
    }

    fn counting(fail: bool) -> Arc<CountingWriter> {
        Arc::new(CountingWriter { calls: AtomicUsize::new(0), fail })
    }

    #[tokio::test]
    async fn test_layer_passes_successful_writes() {
        let writer = counting(false);
        let layer = CircuitBreakerLayer::new(writer.clone(), CircuitBreaker::new("test", CircuitConfig::test()));

        let outcome = layer.write(&LogEntry::new(LogLevel::Information, "ok")).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(layer.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_layer_passes_errors_through() {
        let writer = counting(true);
        let layer = CircuitBreakerLayer::new(writer.clone(), CircuitBreaker::new("test", CircuitConfig::test()));

        let result = layer.write(&LogEntry::new(LogLevel::Error, "x")).await;

        assert_eq!(result, Err(DeliveryError::Unavailable("boom".into())));
        assert_eq!(layer.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_threshold() {
        let writer = counting(true);
        let layer = CircuitBreakerLayer::new(writer.clone(), CircuitBreaker::new("test", CircuitConfig::test()));
        let entry = LogEntry::new(LogLevel::Error, "x");

        let _ = layer.write(&entry).await;
        let _ = layer.write(&entry).await;
        assert_eq!(layer.breaker().state(), CircuitState::Open);

        assert_eq!(layer.write(&entry).await, Err(DeliveryError::CircuitOpen));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_count() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());

        cb.try_acquire().unwrap().failure();
        cb.try_acquire().unwrap().success();
        cb.try_acquire().unwrap().failure();

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_one_trial_after_cooldown() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        trip(&cb);

        tokio::time::advance(Duration::from_millis(60)).await;

        let trial = cb.try_acquire().expect("cooldown elapsed");
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_none(), "second caller must be rejected");

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_for_full_cooldown() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        trip(&cb);
        tokio::time::advance(Duration::from_millis(60)).await;

        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(30)).await;
        assert!(cb.try_acquire().is_none());

        tokio::time::advance(Duration::from_millis(30)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_counts_as_failure() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        trip(&cb);
        tokio::time::advance(Duration::from_millis(60)).await;

        drop(cb.try_acquire().unwrap());

        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_layer_fails_fast_without_calling_backend() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_down(true);
        let layer = CircuitBreakerLayer::new(
            backend.clone(),
            CircuitBreaker::new("backend", CircuitConfig::default()),
        );
        let entry = LogEntry::new(LogLevel::Error, "x");

        for _ in 0..5 {
            assert!(layer.write(&entry).await.is_err());
        }
        assert_eq!(backend.write_calls(), 5);
        assert_eq!(layer.breaker().state(), CircuitState::Open);

        assert_eq!(layer.write(&entry).await, Err(DeliveryError::CircuitOpen));
        assert_eq!(backend.write_calls(), 5);

        backend.set_down(false);
        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(layer.write(&entry).await.unwrap().is_success());
        assert_eq!(backend.write_calls(), 6);
        assert_eq!(layer.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_layer_counts_failed_outcomes() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(2);
        let layer = CircuitBreakerLayer::new(backend, CircuitBreaker::new("t", CircuitConfig::test()));

        let outcome = layer.write(&LogEntry::new(LogLevel::Error, "x")).await.unwrap();
        assert!(outcome.is_failure());
        let _ = layer.write(&LogEntry::new(LogLevel::Error, "y")).await;

        assert_eq!(layer.breaker().state(), CircuitState::Open);
    }

    #[test]
    fn test_circuit_config_defaults() {
        let config = CircuitConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
    }
}
