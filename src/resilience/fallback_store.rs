// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Disk fallback queue for log entries the backend refused.
//!
//! Each entry is one JSON file named `<uuid>.json` in the fallback
//! directory. Files are written as `<uuid>.json.tmp` and renamed into place,
//! so a reader (or the directory watcher) never sees a half-written record.
//!
//! This is NOT a second store - files are "in flight" to the backend and
//! are deleted as soon as a redelivery succeeds.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::EntryWriter;
use crate::log_entry::LogEntry;

const RECORD_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// Failures that make the fallback directory unusable. Fatal at startup.
#[derive(Error, Debug)]
pub enum FallbackStoreError {
    #[error("failed to create fallback directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fallback path {0} exists and is not a directory")]
    NotADirectory(PathBuf),
}

/// Result of loading one fallback file.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedRecord {
    Entry(LogEntry),
    /// Already removed, typically by a concurrent sweep
    Missing,
    /// Unreadable or not a log entry
    Corrupt,
}

/// Counts from one pass over the pending files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub discarded: usize,
    /// Stopped early on cancellation
    pub interrupted: bool,
}

/// Fallback store state for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackStats {
    /// Files written since startup
    pub total_written: u64,
    /// Writes that could not reach disk
    pub write_failures: u64,
    /// Files deleted after delivery
    pub total_deleted: u64,
    /// Corrupt files discarded
    pub total_discarded: u64,
    /// Whether a sweep is currently in progress
    pub sweeping: bool,
}

/// Directory-backed queue of undelivered log entries.
pub struct DiskFallbackStore {
    dir: PathBuf,
    total_written: AtomicU64,
    write_failures: AtomicU64,
    total_deleted: AtomicU64,
    total_discarded: AtomicU64,
    sweeping: AtomicBool,
}

impl DiskFallbackStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, FallbackStoreError> {
        let dir = dir.into();

        fs::create_dir_all(&dir)
            .await
            .map_err(|source| FallbackStoreError::CreateDir { path: dir.clone(), source })?;
        let meta = fs::metadata(&dir)
            .await
            .map_err(|source| FallbackStoreError::CreateDir { path: dir.clone(), source })?;
        if !meta.is_dir() {
            return Err(FallbackStoreError::NotADirectory(dir));
        }

        let store = Self {
            dir,
            total_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            total_deleted: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
            sweeping: AtomicBool::new(false),
        };

        // Files from a previous run
        let pending = store.pending_count().await;
        if pending > 0 {
            warn!(pending, dir = %store.dir.display(), "Fallback directory has entries from previous run, will redeliver");
        } else {
            info!(dir = %store.dir.display(), "Fallback store ready");
        }

        Ok(store)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `path` names a complete fallback record (not a temp file).
    #[must_use]
    pub fn is_record_path(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
    }

    /// Persist an entry. Failures are logged and reported as `None`, never raised.
    pub async fn write(&self, entry: &LogEntry) -> Option<PathBuf> {
        match self.try_write(entry).await {
            Ok(path) => {
                self.total_written.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fallback_written(true);
                info!(id = %entry.id, path = %path.display(), "Log entry written to fallback");
                Some(path)
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fallback_written(false);
                error!(id = %entry.id, error = %e, "Failed to write fallback file, entry lost");
                None
            }
        }
    }

    async fn try_write(&self, entry: &LogEntry) -> std::io::Result<PathBuf> {
        let json = serde_json::to_vec(entry)?;

        // Recreate if removed underneath us
        fs::create_dir_all(&self.dir).await?;

        let name = format!("{}.{}", Uuid::new_v4(), RECORD_EXTENSION);
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{name}{TEMP_SUFFIX}"));

        if let Err(e) = fs::write(&tmp, &json).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        Ok(path)
    }

    /// Complete fallback records currently on disk, sorted by path.
    pub async fn list_pending(&self) -> Vec<PathBuf> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to list fallback directory");
                return Vec::new();
            }
        };

        let mut paths = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if Self::is_record_path(&path) {
                        paths.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Error while listing fallback directory");
                    break;
                }
            }
        }

        paths.sort();
        paths
    }

    /// Number of pending records. Also refreshes the pending gauge.
    pub async fn pending_count(&self) -> usize {
        let count = self.list_pending().await.len();
        crate::metrics::set_fallback_pending(count);
        count
    }

    /// Load one record, telling apart a missing file from a corrupt one.
    pub async fn load(&self, path: &Path) -> LoadedRecord {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadedRecord::Missing,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Fallback file unreadable");
                return LoadedRecord::Corrupt;
            }
        };

        match serde_json::from_slice::<LogEntry>(&bytes) {
            Ok(entry) => LoadedRecord::Entry(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Fallback file could not be decoded");
                LoadedRecord::Corrupt
            }
        }
    }

    /// Read a record; `None` if it is missing or cannot be decoded.
    pub async fn read(&self, path: &Path) -> Option<LogEntry> {
        match self.load(path).await {
            LoadedRecord::Entry(entry) => Some(entry),
            LoadedRecord::Missing | LoadedRecord::Corrupt => None,
        }
    }

    /// Remove a record. Removing an absent file is not an error.
    pub async fn delete(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => {
                self.total_deleted.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fallback_deleted();
                debug!(path = %path.display(), "Fallback file deleted");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete fallback file"),
        }
    }

    /// Delete a corrupt record and count it as discarded.
    pub async fn discard(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => {
                self.total_discarded.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fallback_discarded();
                warn!(path = %path.display(), "Corrupt fallback file discarded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard corrupt fallback file"),
        }
    }

    /// Try every pending record once with `writer`.
    ///
    /// Delivered records are deleted, failed ones stay for the next pass,
    /// corrupt ones are discarded.
    pub async fn retry_all_pending(&self, writer: &dyn EntryWriter) -> SweepReport {
        self.sweep(writer, None).await
    }

    /// Like [`retry_all_pending`](Self::retry_all_pending), stopping between
    /// files once `cancel` fires.
    pub async fn retry_all_pending_until(
        &self,
        writer: &dyn EntryWriter,
        cancel: &CancellationToken,
    ) -> SweepReport {
        self.sweep(writer, Some(cancel)).await
    }

    async fn sweep(&self, writer: &dyn EntryWriter, cancel: Option<&CancellationToken>) -> SweepReport {
        let mut report = SweepReport::default();

        if self.sweeping.swap(true, Ordering::AcqRel) {
            debug!("Fallback sweep already in progress, skipping");
            return report;
        }
        let _guard = SweepGuard(&self.sweeping);

        for path in self.list_pending().await {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                report.interrupted = true;
                break;
            }

            let entry = match self.load(&path).await {
                LoadedRecord::Entry(entry) => entry,
                LoadedRecord::Missing => continue,
                LoadedRecord::Corrupt => {
                    self.discard(&path).await;
                    report.discarded += 1;
                    continue;
                }
            };

            report.attempted += 1;
            match writer.write(&entry).await {
                Ok(outcome) if outcome.is_success() => {
                    self.delete(&path).await;
                    report.delivered += 1;
                    crate::metrics::record_write("sweep", "success");
                }
                Ok(outcome) => {
                    report.failed += 1;
                    crate::metrics::record_write("sweep", "failure");
                    debug!(path = %path.display(), errors = %outcome.error_summary(), "Sweep redelivery failed, file kept");
                }
                Err(e) => {
                    report.failed += 1;
                    crate::metrics::record_write("sweep", "failure");
                    debug!(path = %path.display(), error = %e, "Sweep redelivery failed, file kept");
                }
            }
        }

        if report.attempted > 0 || report.discarded > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                discarded = report.discarded,
                "Fallback sweep complete"
            );
        }
        self.pending_count().await;

        report
    }

    /// Get current stats.
    #[must_use]
    pub fn stats(&self) -> FallbackStats {
        FallbackStats {
            total_written: self.total_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            total_deleted: self.total_deleted.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            sweeping: self.sweeping.load(Ordering::Acquire),
        }
    }
}

/// RAII guard to reset the sweeping flag
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
