// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic resilient-cache usage example.
//!
//! Demonstrates:
//! 1. Connecting to Redis (falls back to local-only if it is not running)
//! 2. Caching a few JSON values with TTLs
//! 3. Reading them back with timing
//! 4. Wildcard invalidation across both tiers
//! 5. Health status and recommendations
//! 6. Displaying metrics (OTEL-compatible)
//! 7. Clean shutdown
//!
//! # Prerequisites (optional)
//!
//! ```bash
//! docker run --rm -p 6379:6379 redis:7-alpine
//! ```
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

use resilient_cache::{CacheConfig, CacheManager, CacheMonitor, ManagerState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║          resilient-cache: Basic Usage Example                 ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the manager
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring resilient-cache...");

    let config = CacheConfig {
        redis_url: Some("redis://localhost:6379".into()),
        // Namespace prefix for Redis keys (plays nice with other data)
        redis_prefix: Some("demo:".into()),
        default_ttl_secs: 120,
        ..Default::default()
    };

    let manager = Arc::new(CacheManager::connect(config).await?);
    manager.start();
    assert_eq!(manager.state(), ManagerState::Running);

    let status = manager.get_status();
    println!("   ✅ Manager running");
    println!("   └─ Redis: {} ({})", status.primary.state, status.primary.last_error.as_deref().unwrap_or("ok"));
    println!("   └─ Local: {}", status.fallback.state);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Cache a few values
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Caching 5 entries...");

    let entries = vec![
        ("clients:list:ADMIN", json!([1, 2, 3])),
        ("clients:list:USER", json!([2, 3])),
        ("clients:detail:1", json!({"name": "Acme", "tier": "gold"})),
        ("clients:detail:2", json!({"name": "Initech", "tier": "silver"})),
        ("config:app", json!({"theme": "dark", "version": "2.0"})),
    ];

    for (key, value) in &entries {
        let start = Instant::now();
        let stored = manager.set_json(key, value, Some(Duration::from_secs(60))).await?;
        println!("   └─ {} → {} (stored={}, {:?})", key, value, stored, start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Read them back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading entries back (with timing)...");

    for (key, _) in &entries {
        let start = Instant::now();
        let value: Option<serde_json::Value> = manager.get_json(key).await;
        match value {
            Some(v) => println!("   └─ {} → {} ({:?})", key, v, start.elapsed()),
            None => println!("   └─ {} → NOT FOUND ({:?})", key, start.elapsed()),
        }
    }
    let missing = manager.get("clients:detail:99").await;
    println!("   └─ clients:detail:99 → {:?}", missing);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Invalidate
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 A client changed: invalidating 'clients:list:*'...");
    let summary = manager.delete_pattern("clients:list:*").await?;
    println!("   └─ Redis: {:?}", summary.primary);
    println!("   └─ Local: {:?}", summary.fallback);
    println!("   └─ Removed {} keys", summary.removed());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Health and recommendations
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🩺 Health check...");
    let status = manager.health_check().await;
    println!("   └─ Fully healthy: {}", status.is_fully_healthy());

    let stats = manager.stats().await;
    println!("\n📊 Cache Stats:");
    println!("   └─ Hits: {}  Misses: {}", stats.hits, stats.misses);
    println!("   └─ Hit rate: {:.1}%", stats.hit_rate().unwrap_or(0.0) * 100.0);
    println!("   └─ Fallback reads/writes: {}/{}", stats.fallback_reads, stats.fallback_writes);
    println!("   └─ Local footprint: {} bytes", stats.local.footprint_bytes());
    if let Some(latency) = stats.average_primary_latency {
        println!("   └─ Avg Redis latency: {:?}", latency);
    }

    println!("\n💡 Recommendations:");
    let report = CacheMonitor::from_config(manager.config()).report(&manager);
    if report.is_empty() {
        println!("   └─ None, the cache looks healthy");
    }
    for rec in &report.recommendations {
        println!("   └─ [{}] {}: {}", rec.priority, rec.category, rec.message);
        println!("      → {}", rec.suggested_action);
    }
    println!("   └─ Impact score: {}", report.impact_score);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Dump raw metrics (OTEL-compatible)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    manager.shutdown().await;
    println!("   ✅ Shutdown complete! State: {:?}", manager.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics in OTEL-compatible format
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters = Vec::new();
    let mut gauges = Vec::new();
    let mut histograms = Vec::new();

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let labels = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, labels, v)),
            DebugValue::Gauge(v) => gauges.push((name, labels, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, labels, count, avg));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    histograms.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("   │  └─ {}{} count={} avg={:.6}", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
