// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search backend seam.
//!
//! - [`traits`]: the single-entry writer, availability probe and bulk sink contracts
//! - [`elastic`]: Elasticsearch data stream over HTTP
//! - [`memory`]: in-process backend with outage simulation

pub mod elastic;
pub mod memory;
pub mod traits;

pub use elastic::ElasticBackend;
pub use memory::{MemoryBackend, WriteFailure};
pub use traits::{AvailabilityProbe, BulkItemResult, BulkResponse, BulkSink, EntryWriter};
