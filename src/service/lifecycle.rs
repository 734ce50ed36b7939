// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Service lifecycle: start and shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batching::BulkWriter;
use crate::reprocessing::ReprocessingWorker;
use crate::resilience::fallback_store::DiskFallbackStore;
use crate::resilience::resilient_writer::ResilientWriter;

use super::{LogRelay, Running, ServiceState, StartupError};

impl LogRelay {
    /// Start the relay.
    ///
    /// Startup flow:
    /// 1. Validate the config
    /// 2. Open (create) the fallback directory
    /// 3. Build the resilient writer around the primary writer
    /// 4. Start the reprocessing worker (seeds the queue from disk, arms the watch)
    /// 5. Start the bulk writer
    ///
    /// Only a bad config or an unusable fallback directory fails startup.
    /// Calling it on a started relay is a no-op; a stopped relay starts
    /// again and picks up whatever fallback files are on disk.
    #[tracing::instrument(skip(self), fields(fallback_dir))]
    pub async fn start(&mut self) -> Result<(), StartupError> {
        if self.running.is_some() {
            warn!(state = %self.state(), "Relay already started");
            return Ok(());
        }

        let startup_start = std::time::Instant::now();
        info!("Starting log relay...");
        self.set_state(ServiceState::Starting);

        if let Err(e) = self.config.validate() {
            error!(error = %e, "Invalid configuration");
            self.set_state(ServiceState::Stopped);
            return Err(e.into());
        }
        // Validated above, so this cannot fail
        if let Err(e) = self.runtime.update(self.config.reprocessing) {
            self.set_state(ServiceState::Stopped);
            return Err(StartupError::Config(e.into()));
        }

        let fallback_path = self.config.fallback_path();
        tracing::Span::current().record("fallback_dir", tracing::field::display(fallback_path.display()));
        let store = match DiskFallbackStore::open(&fallback_path).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "Cannot open fallback directory");
                self.set_state(ServiceState::Stopped);
                return Err(e.into());
            }
        };

        let resilient = Arc::new(ResilientWriter::new(
            self.primary.clone(),
            store.clone(),
            self.config.retry_config(),
            self.config.circuit_config(),
        ));

        let cancel = CancellationToken::new();
        let worker = Arc::new(ReprocessingWorker::new(
            store.clone(),
            resilient.clone(),
            self.primary.clone(),
            self.probe.clone(),
            self.runtime.clone(),
            cancel.child_token(),
        ));
        let reprocessing = worker.start().await;

        let bulk = BulkWriter::new(self.config.bulk_config(), self.sink.clone(), cancel.child_token());
        bulk.start().await;

        self.running = Some(Running {
            store,
            resilient,
            bulk,
            reprocessing,
            cancel,
        });
        self.set_state(ServiceState::Running);
        info!(elapsed = ?startup_start.elapsed(), path = %fallback_path.display(), "Log relay running");
        Ok(())
    }

    /// Stop the relay.
    ///
    /// The directory watch goes first so no new work is queued while the
    /// workers stop, then the reprocessing loop is cancelled, and finally the
    /// bulk queue is drained into the sink.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) {
        let Some(mut running) = self.running.take() else {
            info!("Relay not running, nothing to shut down");
            self.set_state(ServiceState::Stopped);
            return;
        };

        info!(bulk_pending = running.bulk.pending_count(), "Shutting down log relay...");
        self.set_state(ServiceState::ShuttingDown);

        running.reprocessing.shutdown().await;
        running.bulk.shutdown().await;
        running.cancel.cancel();

        let pending = running.store.pending_count().await;
        if pending > 0 {
            info!(pending, "Fallback files left for the next start");
        }

        self.set_state(ServiceState::Stopped);
        info!("Log relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::LogRelayConfig;
    use crate::log_entry::{LogEntry, LogLevel};
    use crate::runtime_state::RuntimeOptions;

    fn config_in(root: &std::path::Path) -> LogRelayConfig {
        LogRelayConfig {
            data_root: root.to_path_buf(),
            retry_max_retries: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown_transitions() {
        let root = tempfile::tempdir().unwrap();
        let mut relay = LogRelay::new(config_in(root.path()), Arc::new(MemoryBackend::new()));
        let rx = relay.state_receiver();
        assert_eq!(relay.state(), ServiceState::Created);

        relay.start().await.unwrap();
        assert_eq!(*rx.borrow(), ServiceState::Running);
        assert!(root.path().join("FallbackLogs").is_dir());

        relay.shutdown().await;
        assert_eq!(*rx.borrow(), ServiceState::Stopped);
        assert!(!relay.is_watching());
    }

    #[tokio::test]
    async fn test_restart_after_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_in(root.path());
        config.bulk_flush_interval_ms = 10;
        let backend = Arc::new(MemoryBackend::new());
        let mut relay = LogRelay::new(config, backend.clone());

        relay.start().await.unwrap();
        relay.shutdown().await;
        relay.start().await.unwrap();
        assert_eq!(relay.state(), ServiceState::Running);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let outcome = relay.submit_bulk(LogEntry::new(LogLevel::Information, "after restart")).await;
        assert!(outcome.is_success());
        assert!(relay.submit(LogEntry::new(LogLevel::Error, "single")).await.is_success());

        // The worker of the second run is alive and redelivers
        backend.set_down(true);
        assert!(relay.submit(LogEntry::new(LogLevel::Error, "deferred")).await.is_failure());
        backend.set_down(false);
        let report = relay.reprocess_now().await.unwrap();
        assert_eq!(report.delivered(), 1);

        relay.shutdown().await;
        assert_eq!(backend.len(), 3);
        assert_eq!(relay.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_startup() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_in(root.path());
        config.bulk_batch_size = 0;
        let mut relay = LogRelay::new(config, Arc::new(MemoryBackend::new()));

        let err = relay.start().await.unwrap_err();

        assert!(matches!(err, StartupError::Config(_)));
        assert_eq!(relay.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_fallback_path_is_a_file_fails_startup() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("FallbackLogs"), b"in the way").unwrap();
        let mut relay = LogRelay::new(config_in(root.path()), Arc::new(MemoryBackend::new()));

        let err = relay.start().await.unwrap_err();

        assert!(matches!(err, StartupError::FallbackStore(_)));
    }

    #[tokio::test]
    async fn test_submit_before_start_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let relay = LogRelay::new(LogRelayConfig::default(), backend.clone());

        let outcome = relay.submit(LogEntry::new(LogLevel::Error, "early")).await;

        assert!(outcome.is_failure());
        assert_eq!(backend.write_calls(), 0);
        assert!(relay.reprocess_now().await.is_none());
    }

    #[tokio::test]
    async fn test_runtime_options_seeded_from_config() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_in(root.path());
        config.reprocessing = RuntimeOptions {
            enable_direct: false,
            interval_seconds: 42,
            ..Default::default()
        };
        let mut relay = LogRelay::new(config, Arc::new(MemoryBackend::new()));
        relay.start().await.unwrap();

        assert_eq!(relay.runtime_options().interval_seconds, 42);
        assert!(!relay.runtime_options().enable_direct);

        relay.update_runtime_options(RuntimeOptions::all_disabled(7)).unwrap();
        assert_eq!(relay.runtime_options().interval_seconds, 7);
        assert!(relay.update_runtime_options(RuntimeOptions::all_disabled(0)).is_err());

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_bulk_queue() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_in(root.path());
        config.bulk_flush_interval_ms = 60_000;
        let backend = Arc::new(MemoryBackend::new());
        let mut relay = LogRelay::new(config, backend.clone());
        relay.start().await.unwrap();

        for i in 0..25 {
            let outcome = relay.submit_bulk(LogEntry::new(LogLevel::Information, format!("bulk {i}"))).await;
            assert!(outcome.is_success());
        }
        relay.shutdown().await;

        assert_eq!(backend.len(), 25);
        let outcome = relay.submit_bulk(LogEntry::new(LogLevel::Information, "late")).await;
        assert!(outcome.is_failure());
    }
}
