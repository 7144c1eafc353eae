// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the cache subsystem.
//!
//! Every field is optional; an empty document yields a working local-only
//! cache. Values that would silently break the cache (zero TTL, zero
//! timeouts, ratios outside their range, a malformed Redis URL) are rejected
//! by [`CacheConfig::validate`], which every constructor calls.
//!
//! # Example
//!
//! ```
//! use resilient_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.default_ttl_secs, 300);
//! assert!(config.validate().is_ok());
//!
//! // Loaded from JSON, partial documents are fine
//! let config = CacheConfig::from_json(r#"{ "distributed_backend_timeout_ms": 150 }"#).unwrap();
//! assert_eq!(config.distributed_backend_timeout_ms, 150);
//! assert_eq!(config.default_ttl_secs, 300);
//! ```

use std::time::Duration;

use redis::IntoConnectionInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration. Fails startup instead of being defaulted away.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("bulk_operation_timeout_ms ({bulk}) must not be shorter than distributed_backend_timeout_ms ({point})")]
    BulkTimeoutTooShort { bulk: u64, point: u64 },

    #[error("{field} must be within (0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("invalid redis_url '{url}': {reason}")]
    InvalidRedisUrl { url: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Configuration for the cache manager, local store and monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a caller passes no TTL or a zero TTL (default: 300s)
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Timeout for point operations against Redis (get/set/delete/ping)
    #[serde(default = "default_distributed_backend_timeout_ms")]
    pub distributed_backend_timeout_ms: u64,

    /// Timeout for broad operations against Redis (delete_pattern/clear/stats)
    #[serde(default = "default_bulk_operation_timeout_ms")]
    pub bulk_operation_timeout_ms: u64,

    /// Local footprint (key + value bytes) the monitor measures pressure against
    #[serde(default = "default_memory_soft_ceiling_bytes")]
    pub memory_soft_ceiling_bytes: u64,

    /// Average Redis latency above which the monitor recommends investigation
    #[serde(default = "default_latency_warn_threshold_ms")]
    pub latency_warn_threshold_ms: u64,

    /// Redis connection string (e.g., "redis://localhost:6379"). None = local only.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Optional key prefix for sharing a Redis instance (e.g., "myapp:")
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// Interval of the background TTL sweep (0 = disabled)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Keys removed per sweep step before yielding to other tasks
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// Interval of the background health probe (0 = disabled)
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// TTL of the sentinel entry written by the local self-test
    #[serde(default = "default_health_check_sentinel_ttl_secs")]
    pub health_check_sentinel_ttl_secs: u64,

    /// Wrap Redis in a circuit breaker
    #[serde(default = "default_circuit_breaker_enabled")]
    pub circuit_breaker_enabled: bool,

    /// Failure rate over the window that trips the breaker
    #[serde(default = "default_circuit_failure_rate")]
    pub circuit_failure_rate: f64,

    /// Number of calls the failure rate is computed over
    #[serde(default = "default_circuit_window")]
    pub circuit_window: usize,

    /// Probe calls let through while half-open
    #[serde(default = "default_circuit_half_open_probes")]
    pub circuit_half_open_probes: usize,

    /// How long the breaker stays open before probing again
    #[serde(default = "default_circuit_open_wait_ms")]
    pub circuit_open_wait_ms: u64,

    /// Share of removals caused by expiry that flags TTLs as too short
    #[serde(default = "default_ttl_expiry_share_threshold")]
    pub ttl_expiry_share_threshold: f64,

    /// Expirations needed before the TTL rule says anything
    #[serde(default = "default_ttl_min_expirations")]
    pub ttl_min_expirations: u64,

    /// Reads needed before the hit-rate rule says anything
    #[serde(default = "default_min_requests_for_hit_rate")]
    pub min_requests_for_hit_rate: u64,
}

fn default_ttl_secs() -> u64 { 300 }
fn default_distributed_backend_timeout_ms() -> u64 { 200 }
fn default_bulk_operation_timeout_ms() -> u64 { 2_000 }
fn default_memory_soft_ceiling_bytes() -> u64 { 64 * 1024 * 1024 } // 64 MB
fn default_latency_warn_threshold_ms() -> u64 { 50 }
fn default_sweep_interval_secs() -> u64 { 60 }
fn default_sweep_batch_size() -> usize { 256 }
fn default_health_check_interval_secs() -> u64 { 30 }
fn default_health_check_sentinel_ttl_secs() -> u64 { 5 }
fn default_circuit_breaker_enabled() -> bool { true }
fn default_circuit_failure_rate() -> f64 { 0.5 }
fn default_circuit_window() -> usize { 20 }
fn default_circuit_half_open_probes() -> usize { 2 }
fn default_circuit_open_wait_ms() -> u64 { 5_000 }
fn default_ttl_expiry_share_threshold() -> f64 { 0.6 }
fn default_ttl_min_expirations() -> u64 { 20 }
fn default_min_requests_for_hit_rate() -> u64 { 1 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            distributed_backend_timeout_ms: default_distributed_backend_timeout_ms(),
            bulk_operation_timeout_ms: default_bulk_operation_timeout_ms(),
            memory_soft_ceiling_bytes: default_memory_soft_ceiling_bytes(),
            latency_warn_threshold_ms: default_latency_warn_threshold_ms(),
            redis_url: None,
            redis_prefix: None,
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
            health_check_interval_secs: default_health_check_interval_secs(),
            health_check_sentinel_ttl_secs: default_health_check_sentinel_ttl_secs(),
            circuit_breaker_enabled: default_circuit_breaker_enabled(),
            circuit_failure_rate: default_circuit_failure_rate(),
            circuit_window: default_circuit_window(),
            circuit_half_open_probes: default_circuit_half_open_probes(),
            circuit_open_wait_ms: default_circuit_open_wait_ms(),
            ttl_expiry_share_threshold: default_ttl_expiry_share_threshold(),
            ttl_min_expirations: default_ttl_min_expirations(),
            min_requests_for_hit_rate: default_min_requests_for_hit_rate(),
        }
    }
}

impl CacheConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would hide misbehaviour behind defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::Zero { field: "default_ttl_secs" });
        }
        if self.distributed_backend_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "distributed_backend_timeout_ms" });
        }
        if self.bulk_operation_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "bulk_operation_timeout_ms" });
        }
        if self.bulk_operation_timeout_ms < self.distributed_backend_timeout_ms {
            return Err(ConfigError::BulkTimeoutTooShort {
                bulk: self.bulk_operation_timeout_ms,
                point: self.distributed_backend_timeout_ms,
            });
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::Zero { field: "sweep_batch_size" });
        }
        if self.health_check_sentinel_ttl_secs == 0 {
            return Err(ConfigError::Zero { field: "health_check_sentinel_ttl_secs" });
        }
        if self.circuit_breaker_enabled {
            check_ratio("circuit_failure_rate", self.circuit_failure_rate)?;
            if self.circuit_window == 0 {
                return Err(ConfigError::Zero { field: "circuit_window" });
            }
            if self.circuit_half_open_probes == 0 {
                return Err(ConfigError::Zero { field: "circuit_half_open_probes" });
            }
        }
        check_ratio("ttl_expiry_share_threshold", self.ttl_expiry_share_threshold)?;
        if let Some(ref url) = self.redis_url {
            url.as_str()
                .into_connection_info()
                .map_err(|e| ConfigError::InvalidRedisUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    #[must_use]
    pub fn distributed_timeout(&self) -> Duration {
        Duration::from_millis(self.distributed_backend_timeout_ms)
    }

    #[must_use]
    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_operation_timeout_ms)
    }

    #[must_use]
    pub fn latency_warn_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_warn_threshold_ms)
    }

    #[must_use]
    pub fn sentinel_ttl(&self) -> Duration {
        Duration::from_secs(self.health_check_sentinel_ttl_secs)
    }

    /// Sweep interval, `None` when the sweeper is disabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Health probe interval, `None` when the probe is disabled.
    #[must_use]
    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_check_interval_secs))
    }
}

fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}
