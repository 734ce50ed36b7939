// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background redelivery of fallback files.
//!
//! One tick:
//! 1. Snapshot the runtime options
//! 2. Probe the backend; if it is down, do nothing else
//! 3. `enable_resilient`: drain the watched queue through the resilient chain,
//!    otherwise drop what is queued (direct and sweep still cover those files)
//! 4. `enable_direct`: redeliver every pending file through the primary writer
//! 5. `enable_retry`: run the fallback store's sweep
//!
//! then sleep `interval_seconds`. A panic inside a tick is caught and logged;
//! the loop carries on with the next tick.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::watcher::FallbackWatcher;
use crate::backend::{AvailabilityProbe, EntryWriter};
use crate::resilience::fallback_store::{DiskFallbackStore, LoadedRecord, SweepReport};
use crate::resilience::resilient_writer::{panic_message, ResilientWriter};
use crate::runtime_state::RuntimeState;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Backend probe was negative; nothing else ran
    pub skipped: bool,
    pub queued: SweepReport,
    pub direct: SweepReport,
    pub sweep: SweepReport,
}

impl TickReport {
    /// Files delivered across all three strategies
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.queued.delivered + self.direct.delivered + self.sweep.delivered
    }
}

/// Redelivers fallback files once the backend is healthy.
pub struct ReprocessingWorker {
    store: Arc<DiskFallbackStore>,
    resilient: Arc<ResilientWriter>,
    primary: Arc<dyn EntryWriter>,
    probe: Arc<dyn AvailabilityProbe>,
    state: Arc<RuntimeState>,
    queue_tx: UnboundedSender<PathBuf>,
    /// Single consumer
    queue_rx: Mutex<UnboundedReceiver<PathBuf>>,
    cancel: CancellationToken,
}

impl ReprocessingWorker {
    pub fn new(
        store: Arc<DiskFallbackStore>,
        resilient: Arc<ResilientWriter>,
        primary: Arc<dyn EntryWriter>,
        probe: Arc<dyn AvailabilityProbe>,
        state: Arc<RuntimeState>,
        cancel: CancellationToken,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            store,
            resilient,
            primary,
            probe,
            state,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            cancel,
        }
    }

    /// Producer side of the queue, for the directory watch.
    #[must_use]
    pub fn queue_sender(&self) -> UnboundedSender<PathBuf> {
        self.queue_tx.clone()
    }

    pub fn enqueue(&self, path: PathBuf) {
        // The receiver lives as long as self
        let _ = self.queue_tx.send(path);
    }

    /// Enqueue every record already on disk. Returns how many.
    pub async fn seed_pending(&self) -> usize {
        let pending = self.store.list_pending().await;
        let count = pending.len();
        for path in pending {
            self.enqueue(path);
        }
        if count > 0 {
            info!(count, "Queued fallback files from previous run");
        }
        count
    }

    /// Run one reprocessing cycle.
    pub async fn tick(&self) -> TickReport {
        let opts = self.state.current();
        let mut report = TickReport::default();

        if !self.probe.is_available().await {
            debug!("Backend unavailable, skipping reprocessing tick");
            report.skipped = true;
            crate::metrics::record_reprocessing_tick("skipped");
            return report;
        }

        if opts.enable_resilient {
            report.queued = self.drain_queue().await;
        } else {
            self.clear_queue().await;
        }
        if opts.enable_direct && !self.cancel.is_cancelled() {
            report.direct = self.redeliver_direct().await;
        }
        if opts.enable_retry && !self.cancel.is_cancelled() {
            report.sweep = self
                .store
                .retry_all_pending_until(self.primary.as_ref(), &self.cancel)
                .await;
        }

        crate::metrics::record_reprocessing_tick("processed");
        if report.delivered() > 0 {
            info!(
                queued = report.queued.delivered,
                direct = report.direct.delivered,
                sweep = report.sweep.delivered,
                "Fallback entries redelivered"
            );
        }
        report
    }

    /// Take everything currently queued and push it through the resilient chain.
    async fn drain_queue(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut rx = self.queue_rx.lock().await;
        let mut seen = HashSet::new();

        while let Ok(path) = rx.try_recv() {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            // A rename can be announced more than once
            if !seen.insert(path.clone()) {
                continue;
            }

            let entry = match self.store.load(&path).await {
                LoadedRecord::Entry(entry) => entry,
                LoadedRecord::Missing => continue,
                LoadedRecord::Corrupt => {
                    self.store.discard(&path).await;
                    report.discarded += 1;
                    continue;
                }
            };

            report.attempted += 1;
            let outcome = self.resilient.deliver(&entry).await;
            if outcome.is_success() {
                self.store.delete(&path).await;
                report.delivered += 1;
            } else {
                report.failed += 1;
                debug!(path = %path.display(), errors = %outcome.error_summary(), "Queued redelivery failed, file kept");
            }
        }

        report
    }

    /// Drop queued paths so the queue stays bounded while the resilient
    /// strategy is switched off. The files themselves stay on disk.
    async fn clear_queue(&self) {
        let mut rx = self.queue_rx.lock().await;
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Resilient strategy off, cleared queued paths");
        }
    }

    /// Paths waiting in the watched queue.
    pub async fn queued_count(&self) -> usize {
        self.queue_rx.lock().await.len()
    }

    /// Redeliver all pending files with the plain primary writer.
    async fn redeliver_direct(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for path in self.store.list_pending().await {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let entry = match self.store.load(&path).await {
                LoadedRecord::Entry(entry) => entry,
                LoadedRecord::Missing => continue,
                LoadedRecord::Corrupt => {
                    self.store.discard(&path).await;
                    report.discarded += 1;
                    continue;
                }
            };

            report.attempted += 1;
            match self.primary.write(&entry).await {
                Ok(outcome) if outcome.is_success() => {
                    self.store.delete(&path).await;
                    report.delivered += 1;
                    crate::metrics::record_write("direct", "success");
                }
                Ok(outcome) => {
                    report.failed += 1;
                    crate::metrics::record_write("direct", "failure");
                    debug!(path = %path.display(), errors = %outcome.error_summary(), "Direct redelivery failed, file kept");
                }
                Err(e) => {
                    report.failed += 1;
                    crate::metrics::record_write("direct", "failure");
                    debug!(path = %path.display(), error = %e, "Direct redelivery failed, file kept");
                }
            }
        }

        report
    }

    /// Tick until cancelled.
    pub async fn run(self: Arc<Self>) {
        info!("Reprocessing worker started");

        while !self.cancel.is_cancelled() {
            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(_) => {}
                Err(panic) => {
                    crate::metrics::record_reprocessing_tick("panicked");
                    error!(panic = %panic_message(panic.as_ref()), "Reprocessing tick panicked, continuing");
                }
            }

            // Re-read so interval changes apply from the next sleep
            let interval = self.state.current().interval();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Reprocessing worker stopped");
    }

    /// Seed the queue, arm the directory watch, and spawn the loop.
    ///
    /// A watch that cannot be armed is logged and skipped; the per-tick
    /// scans still pick every file up.
    pub async fn start(self: Arc<Self>) -> ReprocessingHandle {
        self.seed_pending().await;

        let watcher = match FallbackWatcher::start(self.store.dir(), self.queue_sender()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Could not watch fallback directory, relying on periodic scans");
                None
            }
        };

        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.clone().run());

        ReprocessingHandle {
            worker: self,
            watcher,
            cancel,
            join: Some(join),
        }
    }
}

/// Control handle for a running [`ReprocessingWorker`].
pub struct ReprocessingHandle {
    worker: Arc<ReprocessingWorker>,
    watcher: Option<FallbackWatcher>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ReprocessingHandle {
    #[must_use]
    pub fn worker(&self) -> &Arc<ReprocessingWorker> {
        &self.worker
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(FallbackWatcher::is_enabled)
    }

    /// Disable the watch, cancel the loop and wait for it to finish.
    pub async fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.disable();
        }
        self.cancel.cancel();

        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "Reprocessing worker task failed");
            }
        }
    }
}
