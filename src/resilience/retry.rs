// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with linear or exponential backoff.
//!
//! [`retry`] is the generic helper; [`RetryLayer`] applies it to an
//! [`EntryWriter`], retrying on both errors and failed outcomes.
//!
//! # Example
//!
//! ```
//! use log_relay::RetryConfig;
//! use std::time::Duration;
//!
//! // Delivery: 3 retries at 300ms, 600ms, 900ms
//! let delivery = RetryConfig::delivery();
//! assert_eq!(delivery.max_retries, 3);
//! assert_eq!(delivery.delay_for(2), Duration::from_millis(600));
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::backend::EntryWriter;
use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial_delay * attempt`
    Linear,
    /// `initial_delay * factor^(attempt - 1)`
    Exponential { factor: f64 },
}

/// Configuration for operation retry behavior.
///
/// `max_retries` counts retries after the first attempt, so a write is tried
/// at most `max_retries + 1` times.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::delivery()
    }
}

impl RetryConfig {
    /// Log delivery to the backend: 3 retries, linear 300ms steps.
    #[must_use]
    pub fn delivery() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Linear,
        }
    }

    /// Linear backoff with a custom base delay and retry count.
    #[must_use]
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: base_delay,
            max_delay: Duration::from_secs(30).max(base_delay),
            backoff: Backoff::Linear,
        }
    }

    /// No retries at all; the first failure is final.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::delivery()
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff: Backoff::Linear,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.initial_delay.saturating_mul(attempt),
            Backoff::Exponential { factor } => {
                let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor.powi(exp))
                    .unwrap_or(self.max_delay)
            }
        };
        delay.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, `should_retry` refuses the error, or
/// the retry budget is spent. The last error is returned.
pub async fn retry<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if retries > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, retries);
                }
                return Ok(val);
            }
            Err(err) => {
                if retries >= config.max_retries || !should_retry(&err) {
                    return Err(err);
                }
                retries += 1;

                let delay = config.delay_for(retries);
                warn!(
                    "Operation '{}' failed (retry {}/{}): {}. Retrying in {:?}...",
                    operation_name, retries, config.max_retries, err, delay
                );
                crate::metrics::record_retry(operation_name);

                sleep(delay).await;
            }
        }
    }
}

/// Why one attempt of a wrapped write did not succeed.
enum AttemptFailure {
    Outcome(WriteOutcome),
    Error(DeliveryError),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outcome(outcome) => write!(f, "{}", outcome.error_summary()),
            Self::Error(err) => write!(f, "{err}"),
        }
    }
}

/// Retry decorator around an [`EntryWriter`].
///
/// Every failure is retried up to the budget except a circuit breaker
/// rejection ([`DeliveryError::CircuitOpen`]), which is returned at once.
/// This departs from a retry-everything policy: the breaker has already
/// decided, and retrying it would only burn the budget.
pub struct RetryLayer<W> {
    inner: W,
    config: RetryConfig,
}

impl<W: EntryWriter> RetryLayer<W> {
    pub fn new(inner: W, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    #[must_use]
    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait]
impl<W: EntryWriter> EntryWriter for RetryLayer<W> {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
        let result = retry(
            "resilient_write",
            &self.config,
            || async move {
                match self.inner.write(entry).await {
                    Ok(outcome) if outcome.is_success() => Ok(outcome),
                    Ok(outcome) => Err(AttemptFailure::Outcome(outcome)),
                    Err(err) => Err(AttemptFailure::Error(err)),
                }
            },
            |failure| !matches!(failure, AttemptFailure::Error(DeliveryError::CircuitOpen)),
        )
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(AttemptFailure::Outcome(outcome)) => Ok(outcome),
            Err(AttemptFailure::Error(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::log_entry::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, TestError> =
            retry("test_op", &RetryConfig::test(), || async { Ok(42) }, |_| true).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fail".to_string()))
                }
            },
            |_| true,
        )
        .await;

        assert!(result.unwrap_err().0.contains("always fail"));
        // First attempt plus 3 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_stops_when_predicate_refuses() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("fatal".to_string()))
                }
            },
            |e| e.0 != "fatal",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_linear_delays() {
        let config = RetryConfig::delivery();

        assert_eq!(config.delay_for(1), Duration::from_millis(300));
        assert_eq!(config.delay_for(2), Duration::from_millis(600));
        assert_eq!(config.delay_for(3), Duration::from_millis(900));
    }

    #[test]
    fn test_exponential_delays_cap_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff: Backoff::Exponential { factor: 2.0 },
            max_retries: 5,
        };

        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(4), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_layer_retries_failed_outcomes() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(2);
        let layer = RetryLayer::new(backend.clone(), RetryConfig::delivery());

        let outcome = layer.write(&LogEntry::new(LogLevel::Error, "eventually")).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(backend.write_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_layer_returns_last_failure() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_down(true);
        let layer = RetryLayer::new(backend.clone(), RetryConfig::delivery());

        let result = layer.write(&LogEntry::new(LogLevel::Error, "never")).await;

        assert!(matches!(result, Err(DeliveryError::Unavailable(_))));
        assert_eq!(backend.write_calls(), 4);
    }

    struct RejectingWriter(AtomicUsize);

    #[async_trait]
    impl EntryWriter for RejectingWriter {
        async fn write(&self, _entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::CircuitOpen)
        }
    }

    #[tokio::test]
    async fn test_layer_does_not_retry_circuit_rejection() {
        let layer = RetryLayer::new(RejectingWriter(AtomicUsize::new(0)), RetryConfig::test());

        let result = layer.write(&LogEntry::new(LogLevel::Error, "x")).await;

        assert_eq!(result, Err(DeliveryError::CircuitOpen));
        assert_eq!(layer.inner.0.load(Ordering::SeqCst), 1);
    }
}
