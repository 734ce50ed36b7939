// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process backend for tests and local runs.
//!
//! Implements all three backend traits over a `DashMap` keyed by entry id,
//! with switches to simulate outages and counters to assert on call volume.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::traits::{AvailabilityProbe, BulkItemResult, BulkResponse, BulkSink, EntryWriter};
use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};

/// How single-entry writes should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// Writes succeed
    None,
    /// Writes return a failed outcome
    Outcome,
    /// Writes return an error
    Error,
}

pub struct MemoryBackend {
    docs: DashMap<Uuid, LogEntry>,
    available: AtomicBool,
    write_failure: Mutex<WriteFailure>,
    /// Fail this many upcoming writes, then recover
    fail_next: AtomicU64,
    bulk_reject_marker: Mutex<Option<String>>,

    write_calls: AtomicU64,
    probe_calls: AtomicU64,
    bulk_calls: AtomicU64,
    bulk_batches: Mutex<Vec<usize>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            available: AtomicBool::new(true),
            write_failure: Mutex::new(WriteFailure::None),
            fail_next: AtomicU64::new(0),
            bulk_reject_marker: Mutex::new(None),
            write_calls: AtomicU64::new(0),
            probe_calls: AtomicU64::new(0),
            bulk_calls: AtomicU64::new(0),
            bulk_batches: Mutex::new(Vec::new()),
        }
    }

    /// Simulate a full outage (probe negative, writes error) or recovery.
    pub fn set_down(&self, down: bool) {
        self.available.store(!down, Ordering::SeqCst);
        *self.write_failure.lock() = if down { WriteFailure::Error } else { WriteFailure::None };
    }

    /// Control only what the availability probe reports.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_write_failure(&self, failure: WriteFailure) {
        *self.write_failure.lock() = failure;
    }

    /// Fail the next `n` writes with a failed outcome, then succeed.
    pub fn fail_next(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Bulk items whose message contains `marker` are reported as failed.
    pub fn reject_bulk_messages_containing(&self, marker: impl Into<String>) {
        *self.bulk_reject_marker.lock() = Some(marker.into());
    }

    #[must_use]
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn probe_calls(&self) -> u64 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn bulk_calls(&self) -> u64 {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Sizes of every bulk call received, in order.
    #[must_use]
    pub fn bulk_batches(&self) -> Vec<usize> {
        self.bulk_batches.lock().clone()
    }

    pub fn reset_counters(&self) {
        self.write_calls.store(0, Ordering::SeqCst);
        self.probe_calls.store(0, Ordering::SeqCst);
        self.bulk_calls.store(0, Ordering::SeqCst);
        self.bulk_batches.lock().clear();
    }

    /// Number of distinct documents stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.docs.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<LogEntry> {
        self.docs.get(id).map(|r| r.value().clone())
    }

    fn take_forced_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryWriter for MemoryBackend {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_forced_failure() {
            return Ok(WriteOutcome::failure("injected write failure"));
        }

        let failure = *self.write_failure.lock();
        match failure {
            WriteFailure::None => {
                // Idempotent on id: redelivery overwrites the same document
                self.docs.insert(entry.id, entry.clone());
                Ok(WriteOutcome::success())
            }
            WriteFailure::Outcome => Ok(WriteOutcome::failure("backend rejected write")),
            WriteFailure::Error => Err(DeliveryError::Unavailable("memory backend is down".into())),
        }
    }
}

#[async_trait]
impl AvailabilityProbe for MemoryBackend {
    async fn is_available(&self) -> bool {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkSink for MemoryBackend {
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<BulkResponse, DeliveryError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.bulk_batches.lock().push(entries.len());

        if !self.available.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unavailable("memory backend is down".into()));
        }

        let marker = self.bulk_reject_marker.lock().clone();
        let items = entries
            .iter()
            .map(|entry| {
                let rejected = marker.as_deref().is_some_and(|m| entry.message.contains(m));
                if !rejected {
                    self.docs.insert(entry.id, entry.clone());
                }
                BulkItemResult {
                    id: entry.id.to_string(),
                    error: rejected.then(|| "document rejected".to_string()),
                }
            })
            .collect();

        Ok(BulkResponse { items })
    }
}
