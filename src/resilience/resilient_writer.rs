// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilient single-entry write path.
//!
//! The policy chain, outer to inner:
//!
//! ```text
//! FallbackLayer -> RetryLayer -> CircuitBreakerLayer -> primary writer
//! ```
//!
//! [`ResilientWriter::submit`] runs the chain and, when it ends in failure,
//! persists the entry to the [`DiskFallbackStore`] exactly once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerLayer, CircuitConfig};
use super::fallback_store::DiskFallbackStore;
use super::retry::{RetryConfig, RetryLayer};
use crate::backend::EntryWriter;
use crate::log_entry::LogEntry;
use crate::metrics::LatencyTimer;
use crate::outcome::{DeliveryError, WriteOutcome};

/// Outermost layer: turns every error (and panic) below it into a failed
/// outcome, so callers only ever see `Ok`.
pub struct FallbackLayer<W> {
    inner: W,
}

impl<W: EntryWriter> FallbackLayer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W: EntryWriter> EntryWriter for FallbackLayer<W> {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
        let outcome = match AssertUnwindSafe(self.inner.write(entry)).catch_unwind().await {
            Ok(result) => WriteOutcome::from_result(result),
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!(id = %entry.id, panic = %msg, "Writer panicked");
                WriteOutcome::from_error(DeliveryError::Unexpected(msg))
            }
        };
        Ok(outcome)
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

type PolicyChain = FallbackLayer<RetryLayer<CircuitBreakerLayer<Arc<dyn EntryWriter>>>>;

/// Retry, circuit breaker and disk fallback around the primary writer.
pub struct ResilientWriter {
    chain: PolicyChain,
    store: Arc<DiskFallbackStore>,
}

impl ResilientWriter {
    pub fn new(
        primary: Arc<dyn EntryWriter>,
        store: Arc<DiskFallbackStore>,
        retry: RetryConfig,
        circuit: CircuitConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new("backend", circuit);
        let chain = FallbackLayer::new(RetryLayer::new(
            CircuitBreakerLayer::new(primary, breaker),
            retry,
        ));
        Self { chain, store }
    }

    /// Default policy: 3 linear retries at 300ms, breaker at 5 failures for 30s.
    pub fn with_defaults(primary: Arc<dyn EntryWriter>, store: Arc<DiskFallbackStore>) -> Self {
        Self::new(primary, store, RetryConfig::delivery(), CircuitConfig::default())
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        self.chain.inner.inner().breaker()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DiskFallbackStore> {
        &self.store
    }

    /// Accept an entry: stamp it, run the policy chain, persist on failure.
    ///
    /// Never returns an error; a failed outcome means the entry went to disk
    /// (or, if that also failed, that it was lost and logged).
    #[tracing::instrument(skip(self, entry), fields(id = %entry.id))]
    pub async fn submit(&self, mut entry: LogEntry) -> WriteOutcome {
        let _timer = LatencyTimer::new("resilient", "submit");
        entry.stamp_accepted();

        let mut outcome = self.deliver(&entry).await;
        if outcome.is_success() {
            crate::metrics::record_write("resilient", "success");
            return outcome;
        }

        crate::metrics::record_write("resilient", "failure");
        warn!(errors = %outcome.error_summary(), "Delivery failed, persisting to fallback");

        match self.store.write(&entry).await {
            Some(path) => debug!(path = %path.display(), "Entry queued for reprocessing"),
            None => outcome = outcome.with_error("fallback persistence failed"),
        }
        outcome
    }

    /// Run the policy chain only. Used for redelivery of entries that are
    /// already on disk, so a failure does not create a second file.
    pub async fn deliver(&self, entry: &LogEntry) -> WriteOutcome {
        WriteOutcome::from_result(self.chain.write(entry).await)
    }
}
