// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the relay service.

use thiserror::Error;

use crate::config::ConfigError;
use crate::outcome::DeliveryError;
use crate::resilience::fallback_store::FallbackStoreError;

/// Service lifecycle state.
///
/// Use [`super::LogRelay::state()`] to check the current state or
/// [`super::LogRelay::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Just created, not yet started
    Created,
    /// Opening the fallback directory and spawning workers
    Starting,
    /// Accepting entries
    Running,
    /// Draining the bulk queue and stopping workers
    ShuttingDown,
    /// Everything stopped
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// The only errors allowed to abort startup.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    FallbackStore(#[from] FallbackStoreError),
    #[error("backend client: {0}")]
    Backend(DeliveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_state_display() {
        assert_eq!(format!("{}", ServiceState::Created), "Created");
        assert_eq!(format!("{}", ServiceState::Running), "Running");
        assert_eq!(format!("{}", ServiceState::ShuttingDown), "ShuttingDown");
    }

    #[test]
    fn test_startup_error_wraps_config() {
        let err: StartupError = ConfigError::ZeroBatchSize.into();
        assert!(matches!(err, StartupError::Config(ConfigError::ZeroBatchSize)));
        assert!(err.to_string().contains("bulk_batch_size"));
    }
}
