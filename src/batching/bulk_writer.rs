// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! High-volume write path: queue, coalesce, one bulk call per batch.
//!
//! ```text
//! submit() ──► mpsc queue ──► flush task ──► BulkSink::bulk_index
//!   (stamp,       (bounded or     (recv up to batch_size,
//!    admit)        unbounded)      then wait flush_interval)
//! ```
//!
//! A successful `submit` means the entry was admitted to the queue, not that
//! the backend stored it. Per-item bulk failures are logged and dropped.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch_buffer::{BatchBuffer, FlushBatch, FlushReason};
use crate::backend::BulkSink;
use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};
use crate::resilience::resilient_writer::panic_message;

/// What `submit` does when a bounded queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueFullMode {
    /// Fail immediately with a queue-full outcome
    #[default]
    Reject,
    /// Wait for room up to `timeout`, then fail with a queue-full outcome
    Wait { timeout: Duration },
}

/// Configuration for the bulk writer
#[derive(Debug, Clone)]
pub struct BulkWriterConfig {
    /// Maximum entries per bulk call
    pub batch_size: usize,
    /// Pause after each bulk call
    pub flush_interval: Duration,
    /// Queue capacity; `None` for unbounded
    pub channel_capacity: Option<usize>,
    pub full_mode: QueueFullMode,
}

impl Default for BulkWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            flush_interval: Duration::from_secs(5),
            channel_capacity: Some(10_000),
            full_mode: QueueFullMode::Reject,
        }
    }
}

enum QueueTx {
    Bounded(mpsc::Sender<LogEntry>),
    Unbounded(mpsc::UnboundedSender<LogEntry>),
}

enum QueueRx {
    Bounded(mpsc::Receiver<LogEntry>),
    Unbounded(mpsc::UnboundedReceiver<LogEntry>),
}

impl QueueRx {
    async fn recv_many(&mut self, buf: &mut Vec<LogEntry>, limit: usize) -> usize {
        match self {
            Self::Bounded(rx) => rx.recv_many(buf, limit).await,
            Self::Unbounded(rx) => rx.recv_many(buf, limit).await,
        }
    }

    fn close(&mut self) {
        match self {
            Self::Bounded(rx) => rx.close(),
            Self::Unbounded(rx) => rx.close(),
        }
    }
}

/// Batched bulk writer with a background flush task.
pub struct BulkWriter {
    config: BulkWriterConfig,
    tx: QueueTx,
    /// Held until `start` hands it to the flush task
    rx: Mutex<Option<QueueRx>>,
    sink: Arc<dyn BulkSink>,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BulkWriter {
    pub fn new(config: BulkWriterConfig, sink: Arc<dyn BulkSink>, cancel: CancellationToken) -> Self {
        let (tx, rx) = match config.channel_capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (QueueTx::Bounded(tx), QueueRx::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (QueueTx::Unbounded(tx), QueueRx::Unbounded(rx))
            }
        };

        Self {
            config,
            tx,
            rx: Mutex::new(Some(rx)),
            sink,
            pending: Arc::new(AtomicUsize::new(0)),
            cancel,
            join: tokio::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BulkWriterConfig {
        &self.config
    }

    /// Entries admitted but not yet taken by the flush task.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Stamp and enqueue an entry.
    ///
    /// Success means admitted to the queue. A full queue or a stopped
    /// writer is reported as a failed outcome, never silently dropped.
    pub async fn submit(&self, mut entry: LogEntry) -> WriteOutcome {
        entry.stamp_accepted();

        self.pending.fetch_add(1, Ordering::AcqRel);
        let result = self.admit(entry).await;

        match result {
            Ok(()) => {
                crate::metrics::set_bulk_queue_depth(self.pending_count());
                WriteOutcome::success()
            }
            Err(err) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                let reason = if err == DeliveryError::QueueFull { "full" } else { "closed" };
                crate::metrics::record_bulk_rejected(reason);
                warn!(error = %err, "Bulk submission refused");
                WriteOutcome::from_error(err)
            }
        }
    }

    async fn admit(&self, entry: LogEntry) -> Result<(), DeliveryError> {
        match (&self.tx, self.config.full_mode) {
            (QueueTx::Unbounded(tx), _) => tx.send(entry).map_err(|_| DeliveryError::QueueClosed),
            (QueueTx::Bounded(tx), QueueFullMode::Reject) => tx.try_send(entry).map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::QueueFull,
                TrySendError::Closed(_) => DeliveryError::QueueClosed,
            }),
            (QueueTx::Bounded(tx), QueueFullMode::Wait { timeout }) => {
                match tokio::time::timeout(timeout, tx.send(entry)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(DeliveryError::QueueClosed),
                    Err(_) => Err(DeliveryError::QueueFull),
                }
            }
        }
    }

    fn flush_task(&self, rx: QueueRx) -> FlushTask {
        FlushTask {
            rx,
            sink: self.sink.clone(),
            buffer: BatchBuffer::new(self.config.batch_size),
            flush_interval: self.config.flush_interval,
            pending: self.pending.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Spawn the flush task. Calling it twice is a no-op.
    pub async fn start(&self) {
        let Some(rx) = self.rx.lock().take() else {
            debug!("Bulk writer already started");
            return;
        };
        let task = self.flush_task(rx);

        info!(
            batch_size = self.config.batch_size,
            flush_interval = ?self.config.flush_interval,
            capacity = ?self.config.channel_capacity,
            "Bulk writer started"
        );
        *self.join.lock().await = Some(tokio::spawn(task.run()));
    }

    /// Stop accepting entries, flush everything queued, wait for the task.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        // Never started: drain inline so queued entries are still delivered
        let unstarted = self.rx.lock().take();
        if let Some(rx) = unstarted {
            self.flush_task(rx).run().await;
        }

        let join = self.join.lock().await.take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                error!(error = %e, "Bulk flush task failed");
            }
        }
    }
}

struct FlushTask {
    rx: QueueRx,
    sink: Arc<dyn BulkSink>,
    buffer: BatchBuffer,
    flush_interval: Duration,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl FlushTask {
    async fn run(mut self) {
        loop {
            let limit = self.buffer.remaining();
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                n = self.rx.recv_many(self.buffer.entries_mut(), limit) => n,
            };
            if received == 0 {
                // Queue closed and empty
                break;
            }
            self.pending.fetch_sub(received, Ordering::AcqRel);

            let reason = if self.buffer.is_full() { FlushReason::Count } else { FlushReason::Time };
            let batch = self.buffer.take(reason);
            self.flush(batch).await;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.flush_interval) => {}
            }
        }

        self.drain().await;
    }

    /// Close the queue and flush whatever is left in batch-size chunks.
    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0;

        loop {
            let limit = self.buffer.remaining();
            let received = self.rx.recv_many(self.buffer.entries_mut(), limit).await;
            if received == 0 && self.buffer.is_empty() {
                break;
            }
            self.pending.fetch_sub(received, Ordering::AcqRel);
            drained += self.buffer.len();

            let batch = self.buffer.take(FlushReason::Shutdown);
            self.flush(batch).await;
        }

        crate::metrics::set_bulk_queue_depth(0);
        info!(drained, "Bulk writer drained and stopped");
    }

    async fn flush(&self, batch: FlushBatch) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        let start = std::time::Instant::now();

        let result = AssertUnwindSafe(self.sink.bulk_index(&batch.entries))
            .catch_unwind()
            .await;
        crate::metrics::record_bulk_batch(count, start.elapsed());
        crate::metrics::set_bulk_queue_depth(self.pending.load(Ordering::Acquire));

        match result {
            Ok(Ok(response)) => {
                let failed: Vec<_> = response.failed().collect();
                if failed.is_empty() {
                    crate::metrics::record_write("bulk", "success");
                    debug!(count, reason = batch.reason.as_str(), "Bulk write succeeded");
                    return;
                }
                for item in &failed {
                    warn!(
                        id = %item.id,
                        error = item.error.as_deref().unwrap_or("unknown"),
                        "Bulk item rejected"
                    );
                }
                crate::metrics::record_write("bulk", "partial");
                crate::metrics::record_bulk_item_failures(failed.len());
                error!(failed = failed.len(), count, "Bulk write completed with item errors");
            }
            Ok(Err(e)) => {
                crate::metrics::record_write("bulk", "failure");
                crate::metrics::record_bulk_item_failures(count);
                error!(count, error = %e, "Bulk write failed, batch dropped");
            }
            Err(panic) => {
                crate::metrics::record_write("bulk", "failure");
                error!(count, panic = %panic_message(panic.as_ref()), "Bulk sink panicked, batch dropped");
            }
        }
    }
}
