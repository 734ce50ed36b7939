// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for log-relay.
//!
//! # Example
//!
//! ```
//! use log_relay::LogRelayConfig;
//!
//! // Minimal config (uses defaults)
//! let config = LogRelayConfig::default();
//! assert_eq!(config.data_stream, "logservice-logs");
//! assert_eq!(config.bulk_batch_size, 1000);
//!
//! // Full config
//! let config = LogRelayConfig {
//!     elastic_url: "http://search:9200".into(),
//!     data_root: "/var/lib/log-relay".into(),
//!     retry_max_retries: 5,
//!     bulk_channel_capacity: None, // unbounded
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::batching::{BulkWriterConfig, QueueFullMode};
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::retry::RetryConfig;
use crate::runtime_state::{RuntimeOptions, RuntimeOptionsError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bulk_batch_size must be greater than zero")]
    ZeroBatchSize,
    #[error("bulk_channel_capacity must be greater than zero (omit it for an unbounded queue)")]
    ZeroChannelCapacity,
    #[error("circuit_failure_threshold must be greater than zero")]
    ZeroFailureThreshold,
    #[error("data_stream must not be empty")]
    EmptyDataStream,
    #[error("invalid reprocessing options: {0}")]
    Reprocessing(#[from] RuntimeOptionsError),
}

/// How the bulk path treats a full bounded queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkFullMode {
    #[default]
    Reject,
    Wait,
}

/// Configuration for log-relay.
///
/// All fields have sensible defaults. At minimum, you should configure
/// `elastic_url` and `data_root` for production use.
#[derive(Debug, Clone, Deserialize)]
pub struct LogRelayConfig {
    /// Base directory for on-disk state
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Fallback queue directory, relative to `data_root`
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,

    /// Search backend base URL (e.g., "http://localhost:9200")
    #[serde(default = "default_elastic_url")]
    pub elastic_url: String,

    /// Target data stream
    #[serde(default = "default_data_stream")]
    pub data_stream: String,

    /// Retry policy (linear: base * attempt)
    #[serde(default = "default_retry_max_retries")]
    pub retry_max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Circuit breaker
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_break_secs")]
    pub circuit_break_secs: u64,

    /// Bulk path
    #[serde(default = "default_bulk_batch_size")]
    pub bulk_batch_size: usize,
    #[serde(default = "default_bulk_flush_interval_ms")]
    pub bulk_flush_interval_ms: u64,
    /// Queue capacity (`null` = unbounded)
    #[serde(default = "default_bulk_channel_capacity")]
    pub bulk_channel_capacity: Option<usize>,
    #[serde(default)]
    pub bulk_full_mode: BulkFullMode,
    /// Admission wait in `wait` mode
    #[serde(default = "default_bulk_admission_timeout_ms")]
    pub bulk_admission_timeout_ms: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Initial reprocessing options (changeable at runtime)
    #[serde(default)]
    pub reprocessing: RuntimeOptions,
}

fn default_data_root() -> PathBuf { PathBuf::from("App_Data") }
fn default_fallback_dir() -> PathBuf { PathBuf::from("FallbackLogs") }
fn default_elastic_url() -> String { "http://localhost:9200".to_string() }
fn default_data_stream() -> String { "logservice-logs".to_string() }
fn default_retry_max_retries() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 300 }
fn default_circuit_failure_threshold() -> u32 { 5 }
fn default_circuit_break_secs() -> u64 { 30 }
fn default_bulk_batch_size() -> usize { 1000 }
fn default_bulk_flush_interval_ms() -> u64 { 5000 }
fn default_bulk_channel_capacity() -> Option<usize> { Some(10_000) }
fn default_bulk_admission_timeout_ms() -> u64 { 1000 }
fn default_http_timeout_ms() -> u64 { 10_000 }

impl Default for LogRelayConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            fallback_dir: default_fallback_dir(),
            elastic_url: default_elastic_url(),
            data_stream: default_data_stream(),
            retry_max_retries: default_retry_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_break_secs: default_circuit_break_secs(),
            bulk_batch_size: default_bulk_batch_size(),
            bulk_flush_interval_ms: default_bulk_flush_interval_ms(),
            bulk_channel_capacity: default_bulk_channel_capacity(),
            bulk_full_mode: BulkFullMode::default(),
            bulk_admission_timeout_ms: default_bulk_admission_timeout_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            reprocessing: RuntimeOptions::default(),
        }
    }
}

impl LogRelayConfig {
    /// Reject settings that would wedge or disable a component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.bulk_channel_capacity == Some(0) {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        if self.circuit_failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.data_stream.trim().is_empty() {
            return Err(ConfigError::EmptyDataStream);
        }
        self.reprocessing.validate()?;
        Ok(())
    }

    /// `<data_root>/<fallback_dir>`
    #[must_use]
    pub fn fallback_path(&self) -> PathBuf {
        self.data_root.join(&self.fallback_dir)
    }

    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::linear(self.retry_max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    #[must_use]
    pub fn circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold,
            recovery_timeout: Duration::from_secs(self.circuit_break_secs),
        }
    }

    #[must_use]
    pub fn bulk_config(&self) -> BulkWriterConfig {
        let full_mode = match self.bulk_full_mode {
            BulkFullMode::Reject => QueueFullMode::Reject,
            BulkFullMode::Wait => QueueFullMode::Wait {
                timeout: Duration::from_millis(self.bulk_admission_timeout_ms),
            },
        };
        BulkWriterConfig {
            batch_size: self.bulk_batch_size,
            flush_interval: Duration::from_millis(self.bulk_flush_interval_ms),
            channel_capacity: self.bulk_channel_capacity,
            full_mode,
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_serde_defaults() {
        let from_empty: LogRelayConfig = serde_json::from_value(json!({})).unwrap();
        let default = LogRelayConfig::default();

        assert_eq!(from_empty.data_stream, default.data_stream);
        assert_eq!(from_empty.bulk_channel_capacity, Some(10_000));
        assert_eq!(from_empty.bulk_full_mode, BulkFullMode::Reject);
        assert_eq!(from_empty.reprocessing, RuntimeOptions::default());
        assert_eq!(from_empty.fallback_path(), PathBuf::from("App_Data/FallbackLogs"));
        assert!(default.validate().is_ok());
    }

    #[test]
    fn test_partial_config_overrides() {
        let config: LogRelayConfig = serde_json::from_value(json!({
            "elastic_url": "http://es:9200",
            "bulk_channel_capacity": null,
            "bulk_full_mode": "wait",
            "bulk_admission_timeout_ms": 250,
            "reprocessing": { "enableDirect": false, "intervalSeconds": 10 }
        }))
        .unwrap();

        assert_eq!(config.bulk_channel_capacity, None);
        assert_eq!(
            config.bulk_config().full_mode,
            QueueFullMode::Wait { timeout: Duration::from_millis(250) }
        );
        assert!(!config.reprocessing.enable_direct);
        assert_eq!(config.reprocessing.interval_seconds, 10);
    }

    #[test]
    fn test_policy_conversions() {
        let config = LogRelayConfig::default();

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.delay_for(3), Duration::from_millis(900));

        let circuit = config.circuit_config();
        assert_eq!(circuit.failure_threshold, 5);
        assert_eq!(circuit.recovery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let bad = |f: fn(&mut LogRelayConfig)| {
            let mut c = LogRelayConfig::default();
            f(&mut c);
            c.validate()
        };

        assert_eq!(bad(|c| c.bulk_batch_size = 0), Err(ConfigError::ZeroBatchSize));
        assert_eq!(bad(|c| c.bulk_channel_capacity = Some(0)), Err(ConfigError::ZeroChannelCapacity));
        assert_eq!(bad(|c| c.circuit_failure_threshold = 0), Err(ConfigError::ZeroFailureThreshold));
        assert_eq!(bad(|c| c.data_stream = " ".into()), Err(ConfigError::EmptyDataStream));
        assert_eq!(
            bad(|c| c.reprocessing.interval_seconds = 0),
            Err(ConfigError::Reprocessing(RuntimeOptionsError::ZeroInterval))
        );
    }
}
