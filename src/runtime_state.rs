// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Runtime-switchable reprocessing options.
//!
//! Readers take an immutable snapshot with [`RuntimeState::current`]; writers
//! replace the whole snapshot with [`RuntimeState::update`]. A reader never
//! observes a half-applied update.
//!
//! # Example
//!
//! ```
//! use log_relay::{RuntimeOptions, RuntimeState};
//!
//! let state = RuntimeState::default();
//! assert!(state.current().enable_resilient);
//!
//! state.update(RuntimeOptions { interval_seconds: 10, ..RuntimeOptions::default() }).unwrap();
//! assert_eq!(state.current().interval_seconds, 10);
//!
//! assert!(state.update(RuntimeOptions { interval_seconds: 0, ..RuntimeOptions::default() }).is_err());
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOptionsError {
    #[error("intervalSeconds must be greater than zero")]
    ZeroInterval,
}

/// Which reprocessing strategies run each tick, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Drain the watched queue through the resilient writer
    #[serde(default = "default_true")]
    pub enable_resilient: bool,
    /// Redeliver every pending file through the plain primary writer
    #[serde(default = "default_true")]
    pub enable_direct: bool,
    /// Run the fallback store's retry sweep
    #[serde(default = "default_true")]
    pub enable_retry: bool,
    /// Seconds between ticks
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_true() -> bool { true }
fn default_interval_seconds() -> u64 { 60 }

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            enable_resilient: true,
            enable_direct: true,
            enable_retry: true,
            interval_seconds: default_interval_seconds(),
        }
    }
}

impl RuntimeOptions {
    pub fn validate(&self) -> Result<(), RuntimeOptionsError> {
        if self.interval_seconds == 0 {
            return Err(RuntimeOptionsError::ZeroInterval);
        }
        Ok(())
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Every strategy switched off; ticks still probe and sleep.
    #[must_use]
    pub fn all_disabled(interval_seconds: u64) -> Self {
        Self {
            enable_resilient: false,
            enable_direct: false,
            enable_retry: false,
            interval_seconds,
        }
    }
}

/// Shared holder of the current [`RuntimeOptions`].
pub struct RuntimeState {
    current: ArcSwap<RuntimeOptions>,
}

impl RuntimeState {
    pub fn new(initial: RuntimeOptions) -> Result<Self, RuntimeOptionsError> {
        initial.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(initial),
        })
    }

    /// Snapshot of the options in force right now.
    #[must_use]
    pub fn current(&self) -> Arc<RuntimeOptions> {
        self.current.load_full()
    }

    /// Replace the options wholesale. Invalid input leaves the old value in place.
    pub fn update(&self, options: RuntimeOptions) -> Result<(), RuntimeOptionsError> {
        options.validate()?;
        self.current.store(Arc::new(options));
        info!(
            enable_resilient = options.enable_resilient,
            enable_direct = options.enable_direct,
            enable_retry = options.enable_retry,
            interval_seconds = options.interval_seconds,
            "Reprocessing options updated"
        );
        Ok(())
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(RuntimeOptions::default()),
        }
    }
}
