// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;

use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};

/// Single-entry write contract.
///
/// Implemented by the backend's primary writer and by every resilience
/// layer wrapped around it, so each layer can be tested on its own and
/// composed freely. An `Err` is treated exactly like a failed outcome.
#[async_trait]
pub trait EntryWriter: Send + Sync {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError>;
}

/// Cheap reachability check against the backend. Must have no side effects.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn is_available(&self) -> bool;
}

/// Backend bulk endpoint: one network call per batch.
#[async_trait]
pub trait BulkSink: Send + Sync {
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<BulkResponse, DeliveryError>;
}

/// Per-item result of a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub id: String,
    pub error: Option<String>,
}

/// Response of a bulk call with per-item detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    /// A response where every entry was accepted.
    pub fn all_ok(entries: &[LogEntry]) -> Self {
        Self {
            items: entries
                .iter()
                .map(|e| BulkItemResult { id: e.id.to_string(), error: None })
                .collect(),
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.error.is_some())
    }

    pub fn failed(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|i| i.error.is_some())
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.error.is_none()).count()
    }
}

#[async_trait]
impl<W: EntryWriter + ?Sized> EntryWriter for Arc<W> {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
        (**self).write(entry).await
    }
}

#[async_trait]
impl<P: AvailabilityProbe + ?Sized> AvailabilityProbe for Arc<P> {
    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }
}

#[async_trait]
impl<S: BulkSink + ?Sized> BulkSink for Arc<S> {
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<BulkResponse, DeliveryError> {
        (**self).bulk_index(entries).await
    }
}
