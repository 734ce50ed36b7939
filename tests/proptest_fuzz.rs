// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for log entry decoding.
//!
//! Uses proptest to generate random/malformed inputs and verify that
//! fallback files and queue messages never cause a panic, only clean
//! rejections.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};

use log_relay::resilience::fallback_store::LoadedRecord;
use log_relay::{
    handle_message, CircuitConfig, DiskFallbackStore, LogEntry, LogLevel, MemoryBackend, MessageDisposition,
    ResilientWriter, RetryConfig,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn level_strategy() -> impl Strategy<Value = LogLevel> {
    prop_oneof![
        Just(LogLevel::Verbose),
        Just(LogLevel::Debug),
        Just(LogLevel::Information),
        Just(LogLevel::Success),
        Just(LogLevel::Warning),
        Just(LogLevel::Error),
        Just(LogLevel::Fatal),
    ]
}

/// Metadata values that survive a JSON round trip exactly (no floats)
fn metadata_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".{0,40}".prop_map(Value::String),
    ]
}

/// Generate a valid LogEntry with random optional fields
fn valid_entry_strategy() -> impl Strategy<Value = LogEntry> {
    (
        level_strategy(),
        ".{0,200}",
        proptest::option::of(".{0,100}"),
        proptest::option::of("[0-9a-f]{16,32}"),
        proptest::option::of("[a-z]{1,12}"),
        prop::collection::btree_map("[a-zA-Z]{1,12}", metadata_value_strategy(), 0..6),
    )
        .prop_map(|(level, message, exception, trace_id, tenant, metadata)| {
            let mut entry = LogEntry::new(level, message);
            entry.exception = exception;
            entry.trace_id = trace_id;
            entry.tenant_id = tenant;
            entry.metadata = metadata;
            entry
        })
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10)
                    .prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Deserialization Fuzz Tests
// =============================================================================

proptest! {
    /// LogEntry deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_entry_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..10000)) {
        let result: Result<LogEntry, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }

    /// LogEntry deserialization should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_entry_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_vec(&json).unwrap();
        let result: Result<LogEntry, _> = serde_json::from_slice(&serialized);
        // Either parses (if JSON happens to match the shape) or fails cleanly
        let _ = result;
    }

    /// Corrupted serialized entry should fail gracefully
    #[test]
    fn fuzz_corrupted_entry(
        entry in valid_entry_strategy(),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let serialized = serde_json::to_vec(&entry).unwrap();
        let mut corrupted = serialized.clone();
        let pos = position % corrupted.len();

        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b;
        }

        let result: Result<LogEntry, _> = serde_json::from_slice(&corrupted);
        let _ = result;
    }

    /// Unknown level names are rejected, never defaulted
    #[test]
    fn fuzz_unknown_level_rejected(level in "[A-Z][a-z]{3,10}") {
        prop_assume!(!["Verbose", "Debug", "Information", "Info", "Success", "Warning", "Warn", "Error", "Fatal"]
            .contains(&level.as_str()));
        let body = json!({ "log_level": level, "message": "x" });
        prop_assert!(serde_json::from_value::<LogEntry>(body).is_err());
    }
}

// =============================================================================
// Round Trip Invariants
// =============================================================================

proptest! {
    /// Every field survives serialization, as a fallback file relies on
    #[test]
    fn prop_entry_roundtrip(entry in valid_entry_strategy()) {
        let serialized = serde_json::to_vec(&entry).unwrap();
        let deserialized: LogEntry = serde_json::from_slice(&serialized).unwrap();

        prop_assert_eq!(entry, deserialized);
    }

    /// Level codes follow severity order
    #[test]
    fn prop_level_order_matches_code(a in level_strategy(), b in level_strategy()) {
        prop_assert_eq!(a < b, a.code() < b.code());
    }
}

// =============================================================================
// Fallback File and Queue Message Fuzz Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever ends up in a fallback file, loading it classifies cleanly
    #[test]
    fn fuzz_fallback_file_contents(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let rt = runtime();
        let root = tempfile::tempdir().unwrap();

        let loaded = rt.block_on(async {
            let store = DiskFallbackStore::open(root.path()).await.unwrap();
            let path = root.path().join("fuzzed.json");
            tokio::fs::write(&path, &bytes).await.unwrap();
            store.load(&path).await
        });

        let parses = serde_json::from_slice::<LogEntry>(&bytes).is_ok();
        match loaded {
            LoadedRecord::Entry(_) => prop_assert!(parses),
            LoadedRecord::Corrupt => prop_assert!(!parses),
            LoadedRecord::Missing => prop_assert!(false, "file exists"),
        }
    }

    /// A healthy backend never causes a requeue; garbage is discarded
    #[test]
    fn fuzz_queue_message_disposition(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let rt = runtime();
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());

        let disposition = rt.block_on(async {
            let store = Arc::new(DiskFallbackStore::open(root.path()).await.unwrap());
            let writer = ResilientWriter::new(backend.clone(), store, RetryConfig::none(), CircuitConfig::default());
            handle_message(&bytes, &writer).await
        });

        let parses = serde_json::from_slice::<LogEntry>(&bytes).is_ok();
        let expected = if parses { MessageDisposition::Ack } else { MessageDisposition::Discard };
        prop_assert_eq!(disposition, expected);
    }

    /// Valid entries written to a fallback file load back unchanged
    #[test]
    fn prop_fallback_write_then_load(entry in valid_entry_strategy()) {
        let rt = runtime();
        let root = tempfile::tempdir().unwrap();

        let loaded = rt.block_on(async {
            let store = DiskFallbackStore::open(root.path()).await.unwrap();
            let path = store.write(&entry).await.unwrap();
            store.read(&path).await
        });

        prop_assert_eq!(loaded, Some(entry));
    }
}
