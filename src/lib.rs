// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Resilient Cache
//!
//! A two-tier cache that keeps serving when its distributed backend doesn't.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheManager                         │
//! │  • get / set / delete / delete_pattern / clear              │
//! │  • Per-call timeout + circuit breaker on the primary        │
//! │  • Health state and latency per tier                        │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!         (preferred)                 (on primary failure,
//!               │                      always for invalidation)
//!               ▼                               ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │   Primary: RedisStore     │   │   Fallback: LocalCache      │
//! │  • Lazy, self-healing     │   │  • Sharded DashMap          │
//! │    connection             │   │  • Per-entry TTL + sweeper  │
//! │  • SCAN-based invalidation│   │  • Footprint/expiry counters│
//! └───────────────────────────┘   └─────────────────────────────┘
//!               │                               │
//!               └───────────────┬───────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheMonitor                         │
//! │  • HIT_RATE / MEMORY / LATENCY / TTL / CONNECTION rules     │
//! │  • Prioritized, scored recommendation reports               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_cache::{CacheConfig, CacheManager, CacheMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), resilient_cache::CacheError> {
//!     let config = CacheConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         redis_prefix: Some("myapp:".into()),
//!         ..Default::default()
//!     };
//!
//!     // Starts even if Redis is down
//!     let manager = Arc::new(CacheManager::connect(config).await?);
//!     manager.start();
//!
//!     manager.set("clients:list:ADMIN", b"[1,2,3]", Some(Duration::from_secs(60))).await;
//!     if let Some(bytes) = manager.get("clients:list:ADMIN").await {
//!         println!("cached: {}", String::from_utf8_lossy(&bytes));
//!     }
//!
//!     // A client changed: drop every cached list
//!     manager.delete_pattern("clients:list:*").await?;
//!
//!     let report = CacheMonitor::from_config(manager.config()).report(&manager);
//!     println!("impact score: {}", report.impact_score);
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`manager`]: The [`CacheManager`] failover layer
//! - [`storage`]: The [`CacheBackend`] contract, [`LocalCache`] and [`RedisStore`]
//! - [`monitor`]: Recommendation rules and reports
//! - [`pattern`]: Wildcard invalidation patterns
//! - [`resilience`]: Circuit breaker and retry
//! - [`stats`]: Injectable counters and snapshots
//! - [`metrics`]: `metrics` facade instrumentation

pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod monitor;
pub mod pattern;
pub mod resilience;
pub mod stats;
pub mod storage;
pub mod task;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{CacheConfig, ConfigError};
pub use error::CacheError;
pub use manager::{
    BackendStatus, CacheManager, CacheStatus, HealthState, InvalidationSummary, ManagerState,
    ManagerStats, TierOutcome,
};
pub use metrics::LatencyTimer;
pub use monitor::{
    CacheMonitor, MonitorHandle, MonitorInput, MonitorThresholds, Priority, Recommendation,
    RecommendationCategory, RecommendationReport,
};
pub use pattern::InvalidationPattern;
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError, CircuitState};
pub use resilience::retry::RetryConfig;
pub use stats::{CacheCounters, CacheMetricsSnapshot};
pub use storage::{BackendKind, CacheBackend, CacheEntry, LocalCache, RedisStore, StorageError};
pub use task::TaskHandle;
