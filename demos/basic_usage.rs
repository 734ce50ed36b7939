// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic log-relay usage example.
//!
//! Demonstrates, against the in-memory backend:
//! 1. Starting the relay
//! 2. Delivering entries while the backend is healthy
//! 3. Surviving an outage (entries land in the fallback directory)
//! 4. Redelivery once the backend recovers
//! 5. The bulk path
//! 6. Displaying metrics
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=log_relay=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;

use log_relay::{LogEntry, LogLevel, LogRelay, LogRelayConfig, MemoryBackend, RuntimeOptions};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("log_relay=info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             log-relay: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the relay
    // ─────────────────────────────────────────────────────────────────────────
    let data_root = tempfile::tempdir()?;
    let config = LogRelayConfig {
        data_root: data_root.path().to_path_buf(),
        // Fail fast for the demo
        retry_max_retries: 1,
        retry_base_delay_ms: 50,
        // Flush quickly for the demo
        bulk_batch_size: 4,
        bulk_flush_interval_ms: 250,
        // Long interval: the demo triggers reprocessing by hand
        reprocessing: RuntimeOptions { interval_seconds: 3600, ..Default::default() },
        ..Default::default()
    };

    let backend = Arc::new(MemoryBackend::new());
    let mut relay = LogRelay::new(config, backend.clone());
    println!("📦 State: {}", relay.state());

    relay.start().await?;
    println!("🚀 State: {}", relay.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Healthy backend
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Submitting 3 entries (backend healthy)...");
    for i in 0..3 {
        let entry = LogEntry::new(LogLevel::Information, format!("order {i} placed"))
            .with_source("checkout")
            .with_metadata("orderId", 1000 + i);
        let outcome = relay.submit(entry).await;
        println!("   └─ order {i}: success={}", outcome.is_success());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Outage
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n💥 Backend down, submitting 2 entries...");
    backend.set_down(true);
    for i in 0..2 {
        let entry = LogEntry::new(LogLevel::Error, format!("payment {i} failed")).with_exception("TimeoutError");
        let outcome = relay.submit(entry).await;
        println!("   └─ payment {i}: success={} ({})", outcome.is_success(), outcome.error_summary());
    }
    println!("   Fallback files pending: {}", relay.fallback_pending().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Recovery
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔁 Backend back, reprocessing...");
    backend.set_down(false);
    if let Some(report) = relay.reprocess_now().await {
        println!(
            "   └─ delivered={} (queued={}, direct={}, sweep={})",
            report.delivered(),
            report.queued.delivered,
            report.direct.delivered,
            report.sweep.delivered
        );
    }
    println!("   Fallback files pending: {}", relay.fallback_pending().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Bulk path
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📚 Bulk-submitting 10 entries...");
    for i in 0..10 {
        let outcome = relay.submit_bulk(LogEntry::new(LogLevel::Debug, format!("request {i} served"))).await;
        if !outcome.is_success() {
            println!("   └─ request {i} refused: {}", outcome.error_summary());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown (drains the bulk queue) and metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    relay.shutdown().await;
    println!("   State: {}", relay.state());
    println!("   Documents in backend: {}", backend.len());
    println!("   Bulk calls: {:?}", backend.bulk_batches());

    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

/// Dump all captured metrics
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    histograms.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum) in &histograms {
            println!("   │  └─ {}{} count={} sum={:.4}", name, labels, count, sum);
        }
    }
}
