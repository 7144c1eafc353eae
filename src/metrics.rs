// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `resilient_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `tier`: distributed, local
//! - `operation`: get, set, delete, delete_pattern, clear, ping, stats
//! - `status`: success, miss, error, timeout, rejected

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Record an operation outcome against one tier
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "resilient_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "resilient_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a request served by the local tier because the primary failed
pub fn record_fallback(operation: &str) {
    counter!(
        "resilient_cache_fallbacks_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a distributed tier call that hit its deadline
pub fn record_timeout(operation: &str) {
    counter!(
        "resilient_cache_timeouts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCAL TIER
// ═══════════════════════════════════════════════════════════════════════════

/// Set current local cache footprint in bytes (keys + values)
pub fn set_local_cache_bytes(bytes: u64) {
    gauge!("resilient_cache_local_bytes").set(bytes as f64);
}

/// Set current local cache entry count
pub fn set_local_cache_items(count: usize) {
    gauge!("resilient_cache_local_items").set(count as f64);
}

/// Record entries removed because their TTL ran out
pub fn record_expirations(count: usize) {
    counter!("resilient_cache_expirations_total").increment(count as u64);
}

/// Record keys removed by explicit invalidation
pub fn record_invalidations(tier: &str, count: u64) {
    counter!(
        "resilient_cache_invalidated_keys_total",
        "tier" => tier.to_string()
    )
    .increment(count);
}

// ═══════════════════════════════════════════════════════════════════════════
// BACKEND HEALTH
// ═══════════════════════════════════════════════════════════════════════════

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(tier: &str, healthy: bool) {
    gauge!(
        "resilient_cache_backend_healthy",
        "tier" => tier.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record circuit breaker call
pub fn record_circuit_breaker_call(circuit: &str, outcome: &str) {
    counter!(
        "resilient_cache_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set manager lifecycle state (as string label)
pub fn set_manager_state(state: &str) {
    gauge!(
        "resilient_cache_manager_state",
        "state" => state.to_string()
    )
    .set(1.0);
}

// ═══════════════════════════════════════════════════════════════════════════
// RECOMMENDATIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Set number of open recommendations of one priority
pub fn set_recommendations(priority: &str, count: usize) {
    gauge!(
        "resilient_cache_recommendations",
        "priority" => priority.to_string()
    )
    .set(count as f64);
}

/// Set aggregate impact score of the latest report
pub fn set_impact_score(score: u32) {
    gauge!("resilient_cache_recommendation_impact_score").set(f64::from(score));
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
    ) -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_operation_counter_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_operation("distributed", "get", "success");
            record_operation("distributed", "get", "timeout");
            record_fallback("get");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(counter_value(&snapshot, "resilient_cache_operations_total"), 2);
        assert_eq!(counter_value(&snapshot, "resilient_cache_fallbacks_total"), 1);
    }

    #[test]
    fn test_invalidations_sum_counts() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_invalidations("local", 3);
            record_invalidations("distributed", 4);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(counter_value(&snapshot, "resilient_cache_invalidated_keys_total"), 7);
    }

    // Without a recorder installed these are no-ops; they must not panic.
    #[test]
    fn test_gauges_without_recorder() {
        set_local_cache_bytes(1024 * 1024);
        set_local_cache_items(5000);
        set_backend_healthy("distributed", false);
        set_manager_state("Running");
        set_recommendations("high", 2);
        set_impact_score(25);
        record_timeout("set");
        record_expirations(10);
        record_circuit_breaker_call("redis", "rejected");
    }

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new("local", "get");
        std::thread::sleep(Duration::from_micros(10));
        assert!(timer.elapsed() >= Duration::from_micros(10));
    }
}
