// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relay service.
//!
//! The [`LogRelay`] wires every component together from a [`LogRelayConfig`]:
//! - resilient single-entry path (retry, circuit breaker, disk fallback)
//! - background reprocessing of the fallback directory
//! - batched bulk path
//! - runtime-adjustable reprocessing options
//!
//! # Lifecycle
//!
//! ```text
//! Created → Starting → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use log_relay::{LogEntry, LogLevel, LogRelay, LogRelayConfig, MemoryBackend, ServiceState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = Arc::new(MemoryBackend::new());
//! let mut relay = LogRelay::new(LogRelayConfig::default(), backend);
//! assert_eq!(relay.state(), ServiceState::Created);
//!
//! relay.start().await.expect("fallback directory");
//! let outcome = relay.submit(LogEntry::new(LogLevel::Error, "disk full")).await;
//! assert!(outcome.is_success());
//!
//! relay.shutdown().await;
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::{ServiceState, StartupError};

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{AvailabilityProbe, BulkSink, ElasticBackend, EntryWriter};
use crate::batching::BulkWriter;
use crate::config::LogRelayConfig;
use crate::ingest::{self, MessageDisposition};
use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};
use crate::reprocessing::{ReprocessingHandle, TickReport};
use crate::resilience::fallback_store::DiskFallbackStore;
use crate::resilience::resilient_writer::ResilientWriter;
use crate::runtime_state::{RuntimeOptions, RuntimeOptionsError, RuntimeState};

/// Components that only exist while the service is started.
struct Running {
    store: Arc<DiskFallbackStore>,
    resilient: Arc<ResilientWriter>,
    bulk: BulkWriter,
    reprocessing: ReprocessingHandle,
    /// Fresh for every start, so a stopped relay can be started again
    cancel: CancellationToken,
}

/// Resilient log relay.
///
/// Entries go out either one at a time through [`submit`](Self::submit)
/// (persisted to disk when the backend cannot take them) or batched through
/// [`submit_bulk`](Self::submit_bulk).
pub struct LogRelay {
    config: LogRelayConfig,
    primary: Arc<dyn EntryWriter>,
    probe: Arc<dyn AvailabilityProbe>,
    sink: Arc<dyn BulkSink>,
    runtime: Arc<RuntimeState>,
    state: watch::Sender<ServiceState>,
    state_rx: watch::Receiver<ServiceState>,
    running: Option<Running>,
}

impl LogRelay {
    /// Create a relay over a backend that provides all three endpoints.
    ///
    /// Nothing touches the disk or the network until [`start`](Self::start).
    pub fn new<B>(config: LogRelayConfig, backend: Arc<B>) -> Self
    where
        B: EntryWriter + AvailabilityProbe + BulkSink + 'static,
    {
        Self::from_parts(config, backend.clone(), backend.clone(), backend)
    }

    /// Create a relay from separate writer, probe and bulk endpoints.
    pub fn from_parts(
        config: LogRelayConfig,
        primary: Arc<dyn EntryWriter>,
        probe: Arc<dyn AvailabilityProbe>,
        sink: Arc<dyn BulkSink>,
    ) -> Self {
        let (state, state_rx) = watch::channel(ServiceState::Created);
        crate::metrics::set_service_state("Created");

        Self {
            config,
            primary,
            probe,
            sink,
            runtime: Arc::new(RuntimeState::default()),
            state,
            state_rx,
            running: None,
        }
    }

    /// Create a relay over the Elasticsearch backend named in the config.
    pub fn with_elastic(config: LogRelayConfig) -> Result<Self, StartupError> {
        let backend = ElasticBackend::new(&config.elastic_url, &config.data_stream, config.http_timeout())
            .map_err(StartupError::Backend)?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    #[must_use]
    pub fn config(&self) -> &LogRelayConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ServiceState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    fn set_state(&self, state: ServiceState) {
        debug!(%state, "Service state changed");
        crate::metrics::set_service_state(&state.to_string());
        // Receivers are optional
        let _ = self.state.send(state);
    }

    /// Submit one entry through retry, circuit breaker and disk fallback.
    pub async fn submit(&self, entry: LogEntry) -> WriteOutcome {
        match &self.running {
            Some(running) => running.resilient.submit(entry).await,
            None => WriteOutcome::from_error(DeliveryError::Unavailable("relay is not running".into())),
        }
    }

    /// Enqueue one entry for the next bulk call. Acknowledged at admission.
    pub async fn submit_bulk(&self, entry: LogEntry) -> WriteOutcome {
        match &self.running {
            Some(running) => running.bulk.submit(entry).await,
            None => WriteOutcome::from_error(DeliveryError::QueueClosed),
        }
    }

    /// Decode a queue message and submit it. See [`ingest::handle_message`].
    pub async fn handle_message(&self, body: &[u8]) -> MessageDisposition {
        match &self.running {
            Some(running) => ingest::handle_message(body, &running.resilient).await,
            None => MessageDisposition::Requeue,
        }
    }

    /// Run one reprocessing cycle now, outside the worker's schedule.
    pub async fn reprocess_now(&self) -> Option<TickReport> {
        match &self.running {
            Some(running) => Some(running.reprocessing.worker().tick().await),
            None => None,
        }
    }

    #[must_use]
    pub fn runtime_options(&self) -> Arc<RuntimeOptions> {
        self.runtime.current()
    }

    /// Replace the reprocessing options. Takes effect from the next tick.
    pub fn update_runtime_options(&self, options: RuntimeOptions) -> Result<(), RuntimeOptionsError> {
        self.runtime.update(options)
    }

    /// Fallback files waiting for redelivery.
    pub async fn fallback_pending(&self) -> usize {
        match &self.running {
            Some(running) => running.store.pending_count().await,
            None => 0,
        }
    }

    /// Entries admitted to the bulk queue but not yet taken by a flush.
    #[must_use]
    pub fn bulk_pending(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.bulk.pending_count())
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.reprocessing.is_watching())
    }

    #[must_use]
    pub fn resilient_writer(&self) -> Option<&Arc<ResilientWriter>> {
        self.running.as_ref().map(|r| &r.resilient)
    }
}
