// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background draining of the fallback directory.

pub mod watcher;
pub mod worker;

pub use watcher::FallbackWatcher;
pub use worker::{ReprocessingHandle, ReprocessingWorker, TickReport};
