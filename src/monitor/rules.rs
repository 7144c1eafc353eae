// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recommendation rules.
//!
//! Each rule is a pure function of a [`MonitorInput`] and the thresholds, and
//! returns at most one recommendation. A rule that lacks the data it needs
//! returns `None` rather than guessing.

use std::time::Duration;

use tracing::debug;

use super::types::{Priority, Recommendation, RecommendationCategory};
use crate::config::CacheConfig;
use crate::manager::{CacheStatus, HealthState};
use crate::stats::CacheMetricsSnapshot;

const HIT_RATE_HIGH_BELOW: f64 = 0.5;
const HIT_RATE_MEDIUM_BELOW: f64 = 0.75;
const MEMORY_HIGH_AT: f64 = 0.9;
const MEMORY_MEDIUM_AT: f64 = 0.75;

/// Everything the rules look at.
#[derive(Debug, Clone)]
pub struct MonitorInput {
    pub metrics: CacheMetricsSnapshot,
    pub status: CacheStatus,
    pub average_latency: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorThresholds {
    pub memory_soft_ceiling_bytes: u64,
    pub latency_warn_threshold: Duration,
    pub ttl_expiry_share_threshold: f64,
    pub ttl_min_expirations: u64,
    pub min_requests_for_hit_rate: u64,
}

impl MonitorThresholds {
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            memory_soft_ceiling_bytes: config.memory_soft_ceiling_bytes,
            latency_warn_threshold: config.latency_warn_threshold(),
            ttl_expiry_share_threshold: config.ttl_expiry_share_threshold,
            ttl_min_expirations: config.ttl_min_expirations,
            min_requests_for_hit_rate: config.min_requests_for_hit_rate,
        }
    }
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Run every rule.
#[must_use]
pub fn evaluate(input: &MonitorInput, thresholds: &MonitorThresholds) -> Vec<Recommendation> {
    [
        hit_rate(&input.metrics, thresholds),
        memory(&input.metrics, thresholds),
        latency(input.average_latency, thresholds),
        ttl(&input.metrics, thresholds),
        connection(&input.status),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn hit_rate(metrics: &CacheMetricsSnapshot, thresholds: &MonitorThresholds) -> Option<Recommendation> {
    if metrics.requests() < thresholds.min_requests_for_hit_rate.max(1) {
        return None;
    }
    let rate = finite("hit_rate", metrics.hit_rate()?)?;
    let percent = rate * 100.0;

    if rate < HIT_RATE_HIGH_BELOW {
        Some(Recommendation::new(
            RecommendationCategory::HitRate,
            Priority::High,
            format!("Cache hit rate is {percent:.1}%, most reads go to the data store"),
            "Review which keys are cached and raise TTLs for frequently read data",
        ))
    } else if rate < HIT_RATE_MEDIUM_BELOW {
        Some(Recommendation::new(
            RecommendationCategory::HitRate,
            Priority::Medium,
            format!("Cache hit rate is {percent:.1}%"),
            "Consider caching more read paths or warming hot keys",
        ))
    } else {
        None
    }
}

pub fn memory(metrics: &CacheMetricsSnapshot, thresholds: &MonitorThresholds) -> Option<Recommendation> {
    let ceiling = thresholds.memory_soft_ceiling_bytes;
    if ceiling == 0 {
        return None;
    }
    let used = metrics.footprint_bytes();
    let ratio = finite("memory", used as f64 / ceiling as f64)?;
    let percent = ratio * 100.0;

    if ratio >= MEMORY_HIGH_AT {
        Some(Recommendation::new(
            RecommendationCategory::Memory,
            Priority::High,
            format!("Local cache holds {used} bytes, {percent:.0}% of its {ceiling} byte ceiling"),
            "Shorten TTLs, cache smaller values, or raise memory_soft_ceiling_bytes",
        ))
    } else if ratio >= MEMORY_MEDIUM_AT {
        Some(Recommendation::new(
            RecommendationCategory::Memory,
            Priority::Medium,
            format!("Local cache is at {percent:.0}% of its {ceiling} byte ceiling"),
            "Watch growth and review which namespaces hold the largest values",
        ))
    } else {
        None
    }
}

pub fn latency(average: Option<Duration>, thresholds: &MonitorThresholds) -> Option<Recommendation> {
    let average = average?;
    if average <= thresholds.latency_warn_threshold {
        return None;
    }
    Some(Recommendation::new(
        RecommendationCategory::Latency,
        Priority::Medium,
        format!(
            "Average distributed cache latency is {:.1}ms (threshold {}ms)",
            average.as_secs_f64() * 1000.0,
            thresholds.latency_warn_threshold.as_millis()
        ),
        "Check network path and load on the distributed cache",
    ))
}

pub fn ttl(metrics: &CacheMetricsSnapshot, thresholds: &MonitorThresholds) -> Option<Recommendation> {
    if metrics.expirations < thresholds.ttl_min_expirations {
        return None;
    }
    let share = finite("ttl", metrics.expiry_share()?)?;
    if share < thresholds.ttl_expiry_share_threshold {
        return None;
    }

    let percent = share * 100.0;
    let message = match metrics.top_expiring_namespace() {
        Some((namespace, count)) => format!(
            "{percent:.0}% of removals are TTL expirations, most in namespace '{namespace}' ({count})"
        ),
        None => format!("{percent:.0}% of removals are TTL expirations"),
    };
    Some(Recommendation::new(
        RecommendationCategory::Ttl,
        Priority::Low,
        message,
        "Entries expire before they are invalidated; consider a longer TTL for this namespace",
    ))
}

pub fn connection(status: &CacheStatus) -> Option<Recommendation> {
    let primary = &status.primary;
    if primary.state == HealthState::Unknown || primary.healthy {
        return None;
    }
    let reason = primary.last_error.as_deref().unwrap_or("unknown error");
    Some(Recommendation::new(
        RecommendationCategory::Connection,
        Priority::High,
        format!("Distributed cache is unavailable ({reason}), serving from the local cache"),
        "Restore connectivity to the distributed cache; local entries are not shared between instances",
    ))
}

fn finite(rule: &'static str, value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        debug!(rule, value, "Skipping rule on non-finite input");
        None
    }
}
