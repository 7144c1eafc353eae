// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for patterns, the local tier and the
//! recommendation rules.
//!
//! Uses proptest to generate random inputs and verify nothing panics and the
//! two tiers agree on which keys a pattern covers.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;

use resilient_cache::monitor::rules;
use resilient_cache::{
    CacheConfig, CacheManager, CacheMetricsSnapshot, InvalidationPattern, LocalCache,
    MonitorInput, MonitorThresholds, Priority, RecommendationReport,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Keys built from the characters that matter: separators, glob and regex
/// metacharacters, multi-byte characters, plus plain text.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-c:\\[\\]\\\\.+()|^$ é日]{0,12}"
}

/// Patterns over the same alphabet, with wildcards.
fn pattern_strategy() -> impl Strategy<Value = String> {
    "[a-c:\\[\\]\\\\.+*? é日]{1,8}"
}

/// Reference Redis glob matcher for the subset we emit: `*`, `?` and `\x`.
/// Works on bytes, as Redis does.
fn redis_glob_match(glob: &[u8], key: &[u8]) -> bool {
    match glob.split_first() {
        None => key.is_empty(),
        Some((b'*', rest)) => (0..=key.len()).any(|skip| redis_glob_match(rest, &key[skip..])),
        Some((b'?', rest)) => !key.is_empty() && redis_glob_match(rest, &key[1..]),
        Some((b'\\', rest)) if !rest.is_empty() => {
            key.first() == Some(&rest[0]) && redis_glob_match(&rest[1..], &key[1..])
        }
        Some((byte, rest)) => key.first() == Some(byte) && redis_glob_match(rest, &key[1..]),
    }
}

// =============================================================================
// Pattern Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn fuzz_pattern_never_panics(raw in ".*") {
        match InvalidationPattern::new(&raw) {
            Ok(pattern) => {
                let _ = pattern.is_match(&raw);
                let _ = pattern.to_redis_glob();
            }
            Err(_) => prop_assert!(raw.is_empty()),
        }
    }

    #[test]
    fn prop_literal_pattern_matches_only_itself(key in "[^*?]{1,24}", suffix in "[^*?]{1,4}") {
        let pattern = InvalidationPattern::new(&key).unwrap();
        prop_assert!(pattern.is_literal());
        prop_assert!(pattern.is_match(&key));
        let longer = format!("{key}{suffix}");
        prop_assert!(!pattern.is_match(&longer));
    }

    #[test]
    fn prop_prefix_star_matches_extensions(prefix in "[a-z:\\[\\].]{1,10}", rest in ".{0,10}") {
        let pattern = InvalidationPattern::new(&format!("{prefix}*")).unwrap();
        let key = format!("{prefix}{rest}");
        prop_assert!(pattern.is_match(&key));
    }

    #[test]
    fn prop_redis_glob_agrees_with_local_matcher(raw in pattern_strategy(), key in key_strategy()) {
        let pattern = InvalidationPattern::new(&raw).unwrap();
        let glob = pattern.to_redis_glob();
        let scanned = redis_glob_match(glob.as_bytes(), key.as_bytes());
        let local = pattern.is_match(&key);

        // SCAN never misses a key the local tier would drop
        prop_assert!(scanned || !local, "pattern {:?} glob {:?} key {:?}", raw, glob, key);

        // After narrowing, the Redis tier removes exactly the same keys
        let removed = scanned && (pattern.glob_is_exact() || local);
        prop_assert_eq!(removed, local, "pattern {:?} glob {:?} key {:?}", raw, glob, key);
    }

    #[test]
    fn prop_namespace_pattern_stays_in_namespace(namespace in "[a-z]{1,8}", other in "[a-z]{1,8}", id in "[a-z0-9]{0,8}") {
        let pattern = InvalidationPattern::namespace(&namespace).unwrap();
        let key = format!("{namespace}:{id}");
        prop_assert!(pattern.is_match(&key));
        if other != namespace {
            let foreign = format!("{other}:{id}");
            prop_assert!(!pattern.is_match(&foreign));
        }
    }
}

// =============================================================================
// Local Tier Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_delete_pattern_removes_exactly_matches(
        keys in prop::collection::btree_set(key_strategy(), 0..40),
        raw in pattern_strategy(),
    ) {
        let cache = LocalCache::new(Duration::from_secs(60));
        for key in &keys {
            cache.set(key, key.as_bytes(), None);
        }
        let pattern = InvalidationPattern::new(&raw).unwrap();

        let expected_removed: BTreeSet<_> = keys.iter().filter(|k| pattern.is_match(k)).collect();
        let removed = cache.delete_pattern(&pattern);

        prop_assert_eq!(removed, expected_removed.len());
        prop_assert_eq!(cache.len(), keys.len() - expected_removed.len());
        for key in &keys {
            prop_assert_eq!(cache.get(key).is_some(), !expected_removed.contains(key));
        }
    }

    #[test]
    fn prop_values_roundtrip_byte_exact(key in ".{1,32}", value in prop::collection::vec(any::<u8>(), 0..2048)) {
        let cache = LocalCache::default();
        prop_assert!(cache.set(&key, &value, None));
        prop_assert_eq!(cache.get(&key), Some(value));
    }

    #[test]
    fn prop_footprint_returns_to_zero(
        entries in prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..256), 0..20),
    ) {
        let cache = LocalCache::default();
        for (key, value) in &entries {
            cache.set(key, value, None);
        }
        // Overwrites must not leak footprint
        for (key, value) in &entries {
            cache.set(key, value, None);
        }
        cache.clear();
        prop_assert_eq!(cache.stats().footprint_bytes(), 0);
        prop_assert!(cache.is_empty());
    }
}

// =============================================================================
// Config and Rule Properties
// =============================================================================

fn snapshot_strategy() -> impl Strategy<Value = CacheMetricsSnapshot> {
    (
        any::<u32>(),
        any::<u32>(),
        any::<u64>(),
        any::<u64>(),
        any::<u32>(),
        any::<u32>(),
        prop::collection::btree_map("[a-z]{1,6}", any::<u32>(), 0..5),
    )
        .prop_map(|(hits, misses, key_bytes, value_bytes, expirations, invalidations, by_ns)| {
            CacheMetricsSnapshot {
                hits: u64::from(hits),
                misses: u64::from(misses),
                keys: 0,
                key_size_bytes: key_bytes,
                value_size_bytes: value_bytes,
                expirations: u64::from(expirations),
                invalidations: u64::from(invalidations),
                expirations_by_namespace: by_ns
                    .into_iter()
                    .map(|(ns, n)| (ns, u64::from(n)))
                    .collect(),
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn fuzz_config_from_arbitrary_json(json in ".*") {
        // Either a valid config or a clean error
        if let Ok(config) = CacheConfig::from_json(&json) {
            prop_assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn prop_rules_never_panic_and_score_adds_up(
        metrics in snapshot_strategy(),
        latency_ms in prop::option::of(0u64..10_000),
        ceiling in 0u64..u64::MAX,
    ) {
        let manager = CacheManager::local_only(CacheConfig::default()).unwrap();
        let input = MonitorInput {
            metrics,
            status: manager.get_status(),
            average_latency: latency_ms.map(Duration::from_millis),
        };
        let thresholds = MonitorThresholds {
            memory_soft_ceiling_bytes: ceiling,
            ..MonitorThresholds::default()
        };

        let recs = rules::evaluate(&input, &thresholds);
        prop_assert!(recs.len() <= 5);

        let expected: u32 = recs.iter().map(|r| r.priority.weight()).sum();
        let report = RecommendationReport::new(recs);
        prop_assert_eq!(report.impact_score, expected);

        let priorities: Vec<Priority> = report.recommendations.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        prop_assert_eq!(priorities, sorted);
    }
}
