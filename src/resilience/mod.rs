// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience layers for the single-entry write path.
//!
//! - [`retry`]: linear/exponential retry and the retry decorator
//! - [`circuit_breaker`]: consecutive-failure breaker and its decorator
//! - [`fallback_store`]: on-disk queue of undelivered entries
//! - [`resilient_writer`]: the composed chain with persist-on-failure

pub mod circuit_breaker;
pub mod fallback_store;
pub mod resilient_writer;
pub mod retry;
