// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch accumulation for the bulk write path.
//!
//! A [`BatchBuffer`] holds at most `batch_size` entries between flushes.
//! The bulk writer fills it straight from its queue and takes it as a
//! [`FlushBatch`] tagged with why it was flushed.
//!
//! # Example
//!
//! ```
//! use log_relay::batching::{BatchBuffer, FlushReason};
//! use log_relay::{LogEntry, LogLevel};
//!
//! let mut buffer = BatchBuffer::new(2);
//! buffer.entries_mut().push(LogEntry::new(LogLevel::Information, "a"));
//! assert_eq!(buffer.remaining(), 1);
//! buffer.entries_mut().push(LogEntry::new(LogLevel::Information, "b"));
//! assert!(buffer.is_full());
//!
//! let batch = buffer.take(FlushReason::Count);
//! assert_eq!(batch.len(), 2);
//! assert!(buffer.is_empty());
//! ```

use tracing::debug;

use crate::log_entry::LogEntry;

/// Batch flush trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Batch size reached
    Count,
    /// Flush delay elapsed with a partial batch
    Time,
    /// Draining on shutdown
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Time => "time",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A batch of entries ready for one bulk call
#[derive(Debug)]
pub struct FlushBatch {
    pub entries: Vec<LogEntry>,
    pub reason: FlushReason,
}

impl FlushBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entries accumulated since the last flush.
#[derive(Debug)]
pub struct BatchBuffer {
    entries: Vec<LogEntry>,
    batch_size: usize,
}

impl BatchBuffer {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            entries: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    /// Room left before the batch is full
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.batch_size.saturating_sub(self.entries.len())
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.batch_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Direct access for bulk receives (`recv_many`).
    pub fn entries_mut(&mut self) -> &mut Vec<LogEntry> {
        &mut self.entries
    }

    /// Take the current batch for flushing
    pub fn take(&mut self, reason: FlushReason) -> FlushBatch {
        let entries = std::mem::replace(&mut self.entries, Vec::with_capacity(self.batch_size));
        debug!(count = entries.len(), reason = reason.as_str(), "Batch taken for flush");
        FlushBatch { entries, reason }
    }
}
