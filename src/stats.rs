// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache counters and the snapshots read from them.
//!
//! [`CacheCounters`] is an owned object handed to whoever mutates it (the
//! local store, the manager's request accounting) so tests can inject their
//! own and the monitor can be fed hand-built [`CacheMetricsSnapshot`]s.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::pattern::namespace_of;

/// Distinct namespaces tracked for expirations; later ones share [`OTHER_NAMESPACES`].
pub const MAX_TRACKED_NAMESPACES: usize = 64;

/// Expirations of keys without a `:` separator.
pub const UNNAMESPACED: &str = "(none)";

/// Expirations past the [`MAX_TRACKED_NAMESPACES`] cap.
pub const OTHER_NAMESPACES: &str = "(other)";

/// Live counters. All updates are relaxed atomics; a snapshot is a
/// best-effort read, not a transaction.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    /// Entries removed because their TTL ran out (lazy or swept)
    expirations: AtomicU64,
    /// Entries removed by delete/delete_pattern/clear
    invalidations: AtomicU64,
    key_bytes: AtomicU64,
    value_bytes: AtomicU64,
    expirations_by_namespace: DashMap<String, u64>,
}

impl CacheCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self, key: &str) {
        self.expirations.fetch_add(1, Ordering::Relaxed);

        let namespace = namespace_of(key).unwrap_or(UNNAMESPACED);
        if let Some(mut count) = self.expirations_by_namespace.get_mut(namespace) {
            *count += 1;
            return;
        }
        // Concurrent first sightings can overshoot the cap by a few entries
        let label = if self.expirations_by_namespace.len() >= MAX_TRACKED_NAMESPACES {
            OTHER_NAMESPACES
        } else {
            namespace
        };
        *self
            .expirations_by_namespace
            .entry(label.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_footprint(&self, key_bytes: usize, value_bytes: usize) {
        self.key_bytes.fetch_add(key_bytes as u64, Ordering::Relaxed);
        self.value_bytes.fetch_add(value_bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn remove_footprint(&self, key_bytes: usize, value_bytes: usize) {
        saturating_sub(&self.key_bytes, key_bytes as u64);
        saturating_sub(&self.value_bytes, value_bytes as u64);
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Snapshot with the given live key count.
    #[must_use]
    pub fn snapshot(&self, keys: u64) -> CacheMetricsSnapshot {
        let expirations_by_namespace = self
            .expirations_by_namespace
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        CacheMetricsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            keys,
            key_size_bytes: self.key_bytes.load(Ordering::Relaxed),
            value_size_bytes: self.value_bytes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expirations_by_namespace,
        }
    }

    /// Zero the traffic counters. Footprint is left alone since it describes
    /// entries that still exist.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.expirations_by_namespace.clear();
    }
}

fn saturating_sub(counter: &AtomicU64, amount: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(amount))
    });
}

/// Point-in-time view of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub keys: u64,
    pub key_size_bytes: u64,
    pub value_size_bytes: u64,
    #[serde(default)]
    pub expirations: u64,
    #[serde(default)]
    pub invalidations: u64,
    #[serde(default)]
    pub expirations_by_namespace: BTreeMap<String, u64>,
}

impl CacheMetricsSnapshot {
    /// Total reads observed.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    /// `hits / (hits + misses)`, `None` without any reads.
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.requests();
        if total == 0 {
            return None;
        }
        Some(self.hits as f64 / total as f64)
    }

    /// Bytes held by keys and values together.
    #[must_use]
    pub fn footprint_bytes(&self) -> u64 {
        self.key_size_bytes.saturating_add(self.value_size_bytes)
    }

    /// Share of removals caused by TTL expiry, `None` without removals.
    #[must_use]
    pub fn expiry_share(&self) -> Option<f64> {
        let removals = self.expirations.saturating_add(self.invalidations);
        if removals == 0 {
            return None;
        }
        Some(self.expirations as f64 / removals as f64)
    }

    /// Namespace with the most expirations (ties broken alphabetically).
    #[must_use]
    pub fn top_expiring_namespace(&self) -> Option<(&str, u64)> {
        self.expirations_by_namespace
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(namespace, count)| (namespace.as_str(), *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_undefined_without_reads() {
        let snapshot = CacheCounters::new().snapshot(0);
        assert_eq!(snapshot.hit_rate(), None);
        assert_eq!(snapshot.requests(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let counters = CacheCounters::new();
        for _ in 0..3 {
            counters.record_hit();
        }
        counters.record_miss();

        let snapshot = counters.snapshot(0);
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert!((snapshot.hit_rate().unwrap() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_footprint_never_underflows() {
        let counters = CacheCounters::new();
        counters.add_footprint(4, 10);
        counters.remove_footprint(10, 100);

        let snapshot = counters.snapshot(0);
        assert_eq!(snapshot.key_size_bytes, 0);
        assert_eq!(snapshot.value_size_bytes, 0);
    }

    #[test]
    fn test_expirations_grouped_by_namespace() {
        let counters = CacheCounters::new();
        counters.record_expiration("clients:list:A");
        counters.record_expiration("clients:list:B");
        counters.record_expiration("reports:1");
        counters.record_invalidations(1);

        let snapshot = counters.snapshot(0);
        assert_eq!(snapshot.expirations, 3);
        assert_eq!(snapshot.expirations_by_namespace["clients"], 2);
        assert_eq!(snapshot.top_expiring_namespace(), Some(("clients", 2)));
        assert!((snapshot.expiry_share().unwrap() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expiration_namespaces_stay_bounded() {
        let counters = CacheCounters::new();
        for i in 0..10_000 {
            counters.record_expiration(&format!("session-{i}"));
        }
        for i in 0..500 {
            counters.record_expiration(&format!("tenant{i}:profile"));
        }

        let snapshot = counters.snapshot(0);
        assert_eq!(snapshot.expirations, 10_500);
        assert_eq!(snapshot.expirations_by_namespace[UNNAMESPACED], 10_000);
        assert!(snapshot.expirations_by_namespace.len() <= MAX_TRACKED_NAMESPACES + 1);
        assert_eq!(
            snapshot.expirations_by_namespace.values().sum::<u64>(),
            snapshot.expirations
        );
        assert!(snapshot.expirations_by_namespace[OTHER_NAMESPACES] > 0);
    }

    #[test]
    fn test_tracked_namespace_keeps_counting_past_cap() {
        let counters = CacheCounters::new();
        counters.record_expiration("clients:1");
        for i in 0..MAX_TRACKED_NAMESPACES {
            counters.record_expiration(&format!("ns{i}:1"));
        }
        counters.record_expiration("clients:2");

        let snapshot = counters.snapshot(0);
        assert_eq!(snapshot.expirations_by_namespace["clients"], 2);
        assert_eq!(snapshot.expirations_by_namespace[OTHER_NAMESPACES], 1);
    }

    #[test]
    fn test_reset_keeps_footprint() {
        let counters = CacheCounters::new();
        counters.record_hit();
        counters.record_expiration("a:1");
        counters.add_footprint(3, 5);

        counters.reset();

        let snapshot = counters.snapshot(1);
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.expirations, 0);
        assert!(snapshot.expirations_by_namespace.is_empty());
        assert_eq!(snapshot.footprint_bytes(), 8);
    }
}
