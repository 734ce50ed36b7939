// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk write path: batch accumulation and the queued bulk writer.

pub mod batch_buffer;
pub mod bulk_writer;

pub use batch_buffer::{BatchBuffer, FlushBatch, FlushReason};
pub use bulk_writer::{BulkWriter, BulkWriterConfig, QueueFullMode};
