// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Log Relay
//!
//! Resilient delivery of structured log entries to a search backend.
//!
//! ## Architecture
//!
//! A log entry takes one of two paths:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Single-entry path                        │
//! │  submit() → Retry → Circuit breaker → Primary writer       │
//! │  • Failure after the retry budget → one JSON file on disk  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (fallback files, directory watch)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Reprocessing worker                       │
//! │  • Probe first; backend down → tick does nothing           │
//! │  • Watched queue, direct redelivery, store sweep           │
//! │  • Strategies and interval switchable at runtime           │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Bulk path                              │
//! │  submit_bulk() → bounded queue → batch → one bulk call     │
//! │  • Flush on batch size or flush interval                   │
//! │  • Full queue rejected at admission                        │
//! │  • Drained on shutdown                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use log_relay::{LogEntry, LogLevel, LogRelay, LogRelayConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LogRelayConfig {
//!         elastic_url: "http://localhost:9200".into(),
//!         data_root: "/var/lib/log-relay".into(),
//!         ..Default::default()
//!     };
//!
//!     let mut relay = LogRelay::with_elastic(config).expect("HTTP client");
//!     relay.start().await.expect("Failed to start");
//!
//!     let entry = LogEntry::new(LogLevel::Error, "payment declined")
//!         .with_trace_id("4bf92f3577b34da6")
//!         .with_metadata("orderId", 1234);
//!     let outcome = relay.submit(entry).await;
//!     if !outcome.is_success() {
//!         // Persisted to disk, the reprocessing worker will redeliver it
//!         println!("deferred: {}", outcome.error_summary());
//!     }
//!
//!     relay.shutdown().await;
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`LogRelayConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`service`]: The [`LogRelay`] wiring every component together
//! - [`backend`]: Writer, probe and bulk contracts plus Elasticsearch and in-memory backends
//! - [`resilience`]: Retry, circuit breaker, disk fallback store, resilient writer
//! - [`reprocessing`]: Fallback directory watch and redelivery worker
//! - [`batching`]: Bulk queue and batch buffer
//! - [`runtime_state`]: Hot-swappable reprocessing options
//! - [`ingest`]: Queue message handling

pub mod backend;
pub mod batching;
pub mod config;
pub mod ingest;
pub mod log_entry;
pub mod metrics;
pub mod outcome;
pub mod reprocessing;
pub mod resilience;
pub mod runtime_state;
pub mod service;

pub use backend::{AvailabilityProbe, BulkResponse, BulkSink, ElasticBackend, EntryWriter, MemoryBackend};
pub use batching::{BulkWriter, BulkWriterConfig, QueueFullMode};
pub use config::{BulkFullMode, ConfigError, LogRelayConfig};
pub use ingest::{handle_message, MessageDisposition};
pub use log_entry::{LogEntry, LogLevel};
pub use outcome::{DeliveryError, WriteOutcome};
pub use reprocessing::{ReprocessingWorker, TickReport};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitState};
pub use resilience::fallback_store::{DiskFallbackStore, FallbackStoreError, SweepReport};
pub use resilience::resilient_writer::ResilientWriter;
pub use resilience::retry::RetryConfig;
pub use runtime_state::{RuntimeOptions, RuntimeOptionsError, RuntimeState};
pub use service::{LogRelay, ServiceState, StartupError};
pub use metrics::LatencyTimer;
