// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the cache manager.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::stats::CacheMetricsSnapshot;
use crate::storage::BackendKind;

/// Manager lifecycle state.
///
/// ```text
/// Created → Running → ShuttingDown → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerState {
    /// Constructed, background tasks not started
    Created,
    /// Sweeper and health probe running
    Running,
    /// Stopping background tasks
    ShuttingDown,
    /// Background tasks stopped (the cache itself is still usable)
    Stopped,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Health state of one backend.
///
/// ```text
/// Unknown → Healthy ⇄ Unhealthy
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Not yet observed
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Last known health of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub kind: BackendKind,
    pub state: HealthState,
    pub healthy: bool,
    pub last_checked_at: Option<SystemTime>,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
}

impl BackendStatus {
    /// Whether any probe or operation has reported on this backend yet.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.state != HealthState::Unknown
    }
}

/// Health of both tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub primary: BackendStatus,
    pub fallback: BackendStatus,
}

impl CacheStatus {
    /// True when the cache is serving from its preferred tier.
    #[must_use]
    pub fn is_fully_healthy(&self) -> bool {
        self.primary.healthy && self.fallback.healthy
    }
}

/// Outcome of a broad operation against one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TierOutcome {
    /// Finished. `removed` is the key count when the tier reports one.
    Completed { removed: Option<u64> },
    Failed { error: String },
    /// No backend configured for this tier
    NotConfigured,
}

impl TierOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn removed(&self) -> u64 {
        match self {
            Self::Completed { removed } => removed.unwrap_or(0),
            _ => 0,
        }
    }
}

/// Result of `delete_pattern` / `clear` across both tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationSummary {
    pub pattern: String,
    pub primary: TierOutcome,
    pub fallback: TierOutcome,
}

impl InvalidationSummary {
    /// The call counts as a success if at least one tier completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.primary.is_completed() || self.fallback.is_completed()
    }

    /// Keys removed across both tiers.
    #[must_use]
    pub fn removed(&self) -> u64 {
        self.primary.removed() + self.fallback.removed()
    }
}

/// Request-level and per-tier statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Reads answered with a value, whichever tier served them
    pub hits: u64,
    /// Reads answered with nothing
    pub misses: u64,
    /// Reads served by the local tier after a primary failure
    pub fallback_reads: u64,
    /// Writes stored locally after a primary failure
    pub fallback_writes: u64,
    /// Primary calls that failed, timed out, or were rejected
    pub primary_failures: u64,
    pub average_primary_latency: Option<Duration>,
    pub local: CacheMetricsSnapshot,
    /// Backend-reported counters, when the primary exposes them and answered
    pub distributed: Option<CacheMetricsSnapshot>,
}

impl ManagerStats {
    /// Request hit rate as seen by callers.
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}
