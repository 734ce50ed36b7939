// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Directory watch feeding the reprocessing queue.
//!
//! The notify callback runs on notify's own thread. It only forwards paths
//! of completed records into an unbounded channel; all file I/O happens in
//! the worker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::resilience::fallback_store::DiskFallbackStore;

/// Whether an event announces a record that is now complete on disk.
///
/// Records appear by rename from their temp name, so renames into place
/// count alongside plain creates.
fn announces_record(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any))
    )
}

/// Paths in `event` worth enqueueing.
fn record_paths(event: Event) -> impl Iterator<Item = PathBuf> {
    let wanted = announces_record(&event.kind);
    event
        .paths
        .into_iter()
        .filter(move |p| wanted && DiskFallbackStore::is_record_path(p))
}

/// Live watch on the fallback directory.
pub struct FallbackWatcher {
    watcher: Option<RecommendedWatcher>,
    enabled: Arc<AtomicBool>,
    dir: PathBuf,
}

impl FallbackWatcher {
    /// Start watching `dir` (non-recursive), sending record paths to `tx`.
    pub fn start(dir: &Path, tx: UnboundedSender<PathBuf>) -> notify::Result<Self> {
        let enabled = Arc::new(AtomicBool::new(true));
        let gate = enabled.clone();

        let mut watcher: RecommendedWatcher = Watcher::new(
            move |res: notify::Result<Event>| {
                if !gate.load(Ordering::Acquire) {
                    return;
                }
                match res {
                    Ok(event) => {
                        for path in record_paths(event) {
                            // Receiver gone means the worker has stopped
                            let _ = tx.send(path);
                        }
                    }
                    Err(e) => warn!(error = %e, "Fallback directory watch error"),
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        info!(dir = %dir.display(), "Watching fallback directory");
        Ok(Self {
            watcher: Some(watcher),
            enabled,
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stop delivering events. Safe to call more than once.
    pub fn disable(&mut self) {
        self.enabled.store(false, Ordering::Release);
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.dir) {
                debug!(error = %e, "Unwatch failed during shutdown");
            }
            debug!(dir = %self.dir.display(), "Fallback directory watch disabled");
        }
    }
}

impl Drop for FallbackWatcher {
    fn drop(&mut self) {
        self.disable();
    }
}
