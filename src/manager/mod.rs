// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache manager.
//!
//! The [`CacheManager`] gives callers one cache API over two tiers:
//! - **Primary**: the distributed backend (Redis), every call bounded by a
//!   timeout and optionally guarded by a circuit breaker
//! - **Fallback**: the in-process [`LocalCache`]
//!
//! Point operations try the primary first and only touch the fallback when the
//! primary failed. A primary miss is an answer, not a failure. Broad
//! invalidations (`delete_pattern`, `clear`) always hit both tiers.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use resilient_cache::{CacheConfig, CacheManager, ManagerState};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     ..CacheConfig::default()
//! };
//! let manager = Arc::new(CacheManager::connect(config).await?);
//! manager.start();
//! assert_eq!(manager.state(), ManagerState::Running);
//!
//! manager.set("clients:list:ADMIN", b"[...]", Some(Duration::from_secs(60))).await;
//! let cached = manager.get("clients:list:ADMIN").await;
//! # Ok(())
//! # }
//! ```

mod api;
mod health;
mod latency;
mod lifecycle;
mod types;

pub use types::{
    BackendStatus, CacheStatus, HealthState, InvalidationSummary, ManagerState, ManagerStats,
    TierOutcome,
};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, ConfigError};
use crate::error::CacheError;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::resilience::retry::RetryConfig;
use crate::stats::{CacheCounters, CacheMetricsSnapshot};
use crate::storage::{BackendKind, CacheBackend, LocalCache, RedisStore, StorageError};

use health::BackendHealth;
use latency::LatencyWindow;
use lifecycle::BackgroundTasks;

/// Two-tier cache with failover.
///
/// `Send + Sync`; share it behind an `Arc`.
pub struct CacheManager {
    pub(super) config: CacheConfig,

    /// Distributed tier, `None` when running local-only
    pub(super) primary: Option<Arc<dyn CacheBackend>>,

    /// Local tier as seen through the backend contract
    pub(super) fallback: Arc<dyn CacheBackend>,

    /// Same local tier, for sweeping and footprint stats
    pub(super) local: Arc<LocalCache>,

    pub(super) primary_health: BackendHealth,
    pub(super) fallback_health: BackendHealth,

    pub(super) breaker: Option<CircuitBreaker>,

    /// Wall time of recent primary calls
    pub(super) latency: LatencyWindow,

    /// Hits and misses as callers saw them
    pub(super) requests: Arc<CacheCounters>,
    pub(super) fallback_reads: AtomicU64,
    pub(super) fallback_writes: AtomicU64,
    pub(super) primary_failures: AtomicU64,

    pub(super) state: watch::Sender<ManagerState>,
    pub(super) state_rx: watch::Receiver<ManagerState>,

    pub(super) tasks: Mutex<BackgroundTasks>,
}

/// Operations whose wall time feeds the latency window. Bulk calls (SCAN
/// loops, `INFO`) run under the longer timeout and would skew the average.
const LATENCY_SAMPLED_OPERATIONS: &[&str] = &["get", "set", "delete", "ping"];

impl CacheManager {
    /// Build a manager over the given tiers. `primary` is optional; without
    /// it every operation is served locally.
    pub fn new(
        config: CacheConfig,
        primary: Option<Arc<dyn CacheBackend>>,
        local: Arc<LocalCache>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        let primary_health = match primary {
            Some(ref backend) => BackendHealth::new(backend.kind()),
            None => BackendHealth::not_configured(BackendKind::Distributed),
        };

        let fallback_health = BackendHealth::new(BackendKind::Local);
        if local.is_healthy() {
            fallback_health.record_success();
        } else {
            fallback_health.record_failure("local self-test failed");
        }

        let breaker = (config.circuit_breaker_enabled && primary.is_some())
            .then(|| CircuitBreaker::new("distributed", CircuitConfig::from_config(&config)));

        let (state_tx, state_rx) = watch::channel(ManagerState::Created);
        crate::metrics::set_manager_state(&ManagerState::Created.to_string());

        Ok(Self {
            config,
            primary,
            fallback: Arc::clone(&local) as Arc<dyn CacheBackend>,
            local,
            primary_health,
            fallback_health,
            breaker,
            latency: LatencyWindow::default(),
            requests: Arc::new(CacheCounters::new()),
            fallback_reads: AtomicU64::new(0),
            fallback_writes: AtomicU64::new(0),
            primary_failures: AtomicU64::new(0),
            state: state_tx,
            state_rx,
            tasks: Mutex::new(BackgroundTasks::default()),
        })
    }

    /// Local-only manager.
    pub fn local_only(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let local = Arc::new(LocalCache::from_config(&config));
        Self::new(config, None, local)
    }

    /// Build the tiers described by `config` and warm up the Redis connection.
    ///
    /// An unreachable Redis does not fail construction: the manager starts
    /// with the primary marked unhealthy and reconnects on demand.
    #[tracing::instrument(skip(config), fields(has_redis = config.redis_url.is_some()))]
    pub async fn connect(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let local = Arc::new(LocalCache::from_config(&config));

        let Some(url) = config.redis_url.clone() else {
            warn!("No redis_url configured, serving from the local cache only");
            return Self::new(config, None, local);
        };

        let store = RedisStore::new(&url, config.redis_prefix.as_deref()).map_err(|e| {
            ConfigError::InvalidRedisUrl {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        let warm_up = store
            .warm_up(&RetryConfig::startup(), config.bulk_timeout())
            .await;

        let manager = Self::new(config, Some(Arc::new(store)), local)?;
        match warm_up {
            Ok(()) => {
                manager.primary_health.record_success();
                info!("Distributed cache connected");
            }
            Err(e) => {
                warn!(error = %e, "Distributed cache unreachable at startup, continuing on local cache");
                manager.primary_health.record_failure(e.to_string());
            }
        }
        Ok(manager)
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ManagerState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// The local tier.
    #[must_use]
    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    /// Request-level hit/miss counters.
    #[must_use]
    pub fn request_counters(&self) -> Arc<CacheCounters> {
        Arc::clone(&self.requests)
    }

    /// Mean wall time of recent primary calls.
    #[must_use]
    pub fn average_primary_latency(&self) -> Option<Duration> {
        self.latency.average()
    }

    /// Request hits/misses combined with the local tier's footprint and
    /// expiry counters.
    #[must_use]
    pub fn combined_snapshot(&self) -> CacheMetricsSnapshot {
        let mut snapshot = self.local.stats();
        snapshot.hits = self.requests.hits();
        snapshot.misses = self.requests.misses();
        snapshot
    }

    fn set_state(&self, state: ManagerState) {
        let _ = self.state.send(state);
        crate::metrics::set_manager_state(&state.to_string());
    }

    /// Run one primary call under the timeout and breaker, recording latency
    /// and health. `None` when no primary is configured.
    pub(super) async fn call_primary<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        f: F,
    ) -> Option<Result<T, StorageError>>
    where
        F: FnOnce(Arc<dyn CacheBackend>) -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let primary = Arc::clone(self.primary.as_ref()?);
        let started = Instant::now();

        let attempt = async move {
            match tokio::time::timeout(timeout, f(primary)).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout { operation, timeout }),
            }
        };

        let result = match self.breaker {
            Some(ref breaker) => breaker.call(|| attempt).await.map_err(|e| match e {
                CircuitError::Rejected => StorageError::Rejected,
                CircuitError::Inner(e) => e,
            }),
            None => attempt.await,
        };

        let elapsed = started.elapsed();
        let sampled = LATENCY_SAMPLED_OPERATIONS.contains(&operation);
        match result {
            Ok(_) => {
                if sampled {
                    self.latency.record(elapsed);
                }
                self.primary_health.record_success();
                crate::metrics::record_operation("distributed", operation, "success");
                crate::metrics::record_latency("distributed", operation, elapsed);
            }
            Err(StorageError::Rejected) => {
                self.primary_failures.fetch_add(1, Ordering::Relaxed);
                self.primary_health.record_failure(StorageError::Rejected.to_string());
                debug!(operation, "Distributed call rejected by open circuit");
                crate::metrics::record_operation("distributed", operation, "rejected");
            }
            Err(ref e) => {
                if sampled {
                    self.latency.record(elapsed);
                }
                self.primary_failures.fetch_add(1, Ordering::Relaxed);
                self.primary_health.record_failure(e.to_string());
                warn!(
                    operation,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Distributed cache call failed"
                );
                crate::metrics::record_operation("distributed", operation, e.kind());
                crate::metrics::record_latency("distributed", operation, elapsed);
                if matches!(e, StorageError::Timeout { .. }) {
                    crate::metrics::record_timeout(operation);
                }
            }
        }
        Some(result)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("state", &self.state())
            .field("has_primary", &self.has_primary())
            .field("local_entries", &self.local.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_only_reports_primary_not_configured() {
        let manager = CacheManager::local_only(CacheConfig::default()).unwrap();

        let status = manager.get_status();
        assert!(!manager.has_primary());
        assert!(!status.primary.healthy);
        assert_eq!(
            status.primary.last_error.as_deref(),
            Some("distributed backend not configured")
        );
        assert!(status.fallback.healthy);
        assert_eq!(manager.state(), ManagerState::Created);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = CacheConfig { default_ttl_secs: 0, ..CacheConfig::default() };
        assert!(matches!(
            CacheManager::local_only(config),
            Err(CacheError::Config(ConfigError::Zero { .. }))
        ));
    }

    #[tokio::test]
    async fn test_connect_without_redis_is_local_only() {
        let manager = CacheManager::connect(CacheConfig::default()).await.unwrap();
        assert!(!manager.has_primary());

        assert!(manager.set("a", b"1", None).await);
        assert_eq!(manager.get("a").await, Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_only_point_operations_feed_latency_window() {
        let primary: Arc<dyn CacheBackend> = Arc::new(LocalCache::default());
        let manager =
            CacheManager::new(CacheConfig::default(), Some(primary), Arc::new(LocalCache::default()))
                .unwrap();

        manager.set("clients:1", b"x", None).await;
        let _ = manager.delete_pattern("clients:*").await.unwrap();
        let _ = manager.clear().await;
        let _ = manager.stats().await;
        assert_eq!(manager.latency.len(), 1);

        let _ = manager.get("clients:1").await;
        manager.delete("clients:1").await;
        let _ = manager.health_check().await;
        assert_eq!(manager.latency.len(), 4);
    }

    #[tokio::test]
    async fn test_combined_snapshot_merges_request_counters() {
        let manager = CacheManager::local_only(CacheConfig::default()).unwrap();
        manager.set("a", b"1", None).await;
        let _ = manager.get("a").await;
        let _ = manager.get("b").await;

        let snapshot = manager.combined_snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.keys, 1);
        assert!(snapshot.footprint_bytes() > 0);
    }
}
