// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-facing cache operations.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{CacheStatus, InvalidationSummary, ManagerStats, TierOutcome};
use super::CacheManager;
use crate::error::CacheError;
use crate::pattern::InvalidationPattern;
use crate::storage::StorageError;

impl CacheManager {
    /// Read `key`.
    ///
    /// A miss on a healthy primary is final; the local tier is only consulted
    /// when the primary call failed.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = match self
            .call_primary("get", self.config.distributed_timeout(), |primary| async move {
                primary.get(key).await
            })
            .await
        {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                self.fallback_reads.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fallback("get");
                self.fallback_get(key).await
            }
            None => self.fallback_get(key).await,
        };

        if value.is_some() {
            self.requests.record_hit();
        } else {
            self.requests.record_miss();
        }
        value
    }

    /// Store `value` under `key`. `None` or a zero TTL means the configured
    /// default.
    ///
    /// Written to the primary only, or to the local tier only if the primary
    /// failed. Returns whether some tier accepted the write.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        let ttl = self.resolve_ttl(ttl);

        match self
            .call_primary("set", self.config.distributed_timeout(), |primary| async move {
                primary.set(key, value, ttl).await
            })
            .await
        {
            Some(Ok(())) => true,
            Some(Err(_)) => {
                self.fallback_writes.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_fallback("set");
                self.fallback_set(key, value, ttl).await
            }
            None => self.fallback_set(key, value, ttl).await,
        }
    }

    /// Remove `key` from whichever tier currently serves it.
    pub async fn delete(&self, key: &str) -> bool {
        match self
            .call_primary("delete", self.config.distributed_timeout(), |primary| async move {
                primary.delete(key).await
            })
            .await
        {
            Some(Ok(())) => true,
            Some(Err(_)) => {
                crate::metrics::record_fallback("delete");
                self.fallback_delete(key).await
            }
            None => self.fallback_delete(key).await,
        }
    }

    /// Remove every key matching `pattern` from both tiers.
    ///
    /// Fails only on an invalid pattern. A tier that fails is reported in the
    /// summary; see [`InvalidationSummary::succeeded`].
    pub async fn delete_pattern(&self, pattern: &str) -> Result<InvalidationSummary, CacheError> {
        let pattern = InvalidationPattern::new(pattern)?;
        Ok(self.invalidate(&pattern).await)
    }

    /// Remove every key of `namespace` (`namespace:*`) from both tiers.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<InvalidationSummary, CacheError> {
        let pattern = InvalidationPattern::namespace(namespace)?;
        Ok(self.invalidate(&pattern).await)
    }

    /// Remove everything from both tiers.
    pub async fn clear(&self) -> InvalidationSummary {
        let bulk = self.config.bulk_timeout();
        let (primary, fallback) = tokio::join!(
            self.call_primary("clear", bulk, |primary| async move { primary.clear().await }),
            self.fallback.clear(),
        );

        let summary = InvalidationSummary {
            pattern: InvalidationPattern::all().to_string(),
            primary: tier_outcome(primary.map(|r| r.map(|()| None))),
            fallback: self.local_outcome(fallback.map(|()| None)),
        };
        self.log_invalidation(&summary);
        summary
    }

    /// Last known health of both tiers. No I/O.
    #[must_use]
    pub fn get_status(&self) -> CacheStatus {
        CacheStatus {
            primary: self.primary_health.status(),
            fallback: self.fallback_health.status(),
        }
    }

    /// Probe both tiers now and return the refreshed status.
    pub async fn health_check(&self) -> CacheStatus {
        let _ = self
            .call_primary("ping", self.config.distributed_timeout(), |primary| async move {
                primary.ping().await
            })
            .await;

        match self.fallback.ping().await {
            Ok(()) => self.fallback_health.record_success(),
            Err(e) => self.fallback_health.record_failure(e.to_string()),
        }

        self.get_status()
    }

    /// Read and decode a JSON value. A value that doesn't decode as `T` is
    /// treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached value failed to decode, treating as miss");
                None
            }
        }
    }

    /// Encode `value` as JSON and store it.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        Ok(self.set(key, &bytes, ttl).await)
    }

    /// Request counters, local snapshot, and the primary's own stats when it
    /// reports them.
    pub async fn stats(&self) -> ManagerStats {
        let distributed = match self
            .call_primary("stats", self.config.bulk_timeout(), |primary| async move {
                primary.stats().await
            })
            .await
        {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => {
                debug!(error = %e, "Distributed stats unavailable");
                None
            }
            None => None,
        };

        ManagerStats {
            hits: self.requests.hits(),
            misses: self.requests.misses(),
            fallback_reads: self.fallback_reads.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
            primary_failures: self.primary_failures.load(Ordering::Relaxed),
            average_primary_latency: self.latency.average(),
            local: self.local.stats(),
            distributed,
        }
    }

    pub(super) async fn invalidate(&self, pattern: &InvalidationPattern) -> InvalidationSummary {
        let bulk = self.config.bulk_timeout();
        let (primary, fallback) = tokio::join!(
            self.call_primary("delete_pattern", bulk, |primary| async move {
                primary.delete_pattern(pattern).await
            }),
            self.fallback.delete_pattern(pattern),
        );

        let summary = InvalidationSummary {
            pattern: pattern.to_string(),
            primary: tier_outcome(primary.map(|r| r.map(Some))),
            fallback: self.local_outcome(fallback.map(Some)),
        };

        if let TierOutcome::Completed { removed: Some(n) } = summary.primary {
            crate::metrics::record_invalidations("distributed", n);
        }
        if let TierOutcome::Completed { removed: Some(n) } = summary.fallback {
            crate::metrics::record_invalidations("local", n);
        }
        self.log_invalidation(&summary);
        summary
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.config.default_ttl(),
        }
    }

    async fn fallback_get(&self, key: &str) -> Option<Vec<u8>> {
        match self.fallback.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.fallback_health.record_failure(e.to_string());
                warn!(key, error = %e, "Local cache read failed");
                None
            }
        }
    }

    async fn fallback_set(&self, key: &str, value: &[u8], ttl: Duration) -> bool {
        match self.fallback.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.fallback_health.record_failure(e.to_string());
                warn!(key, error = %e, "Local cache write failed");
                false
            }
        }
    }

    async fn fallback_delete(&self, key: &str) -> bool {
        match self.fallback.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                self.fallback_health.record_failure(e.to_string());
                warn!(key, error = %e, "Local cache delete failed");
                false
            }
        }
    }

    fn local_outcome(&self, result: Result<Option<u64>, StorageError>) -> TierOutcome {
        if let Err(ref e) = result {
            self.fallback_health.record_failure(e.to_string());
        }
        tier_outcome(Some(result))
    }

    fn log_invalidation(&self, summary: &InvalidationSummary) {
        if summary.succeeded() {
            debug!(
                pattern = %summary.pattern,
                removed = summary.removed(),
                "Invalidation complete"
            );
        } else {
            warn!(
                pattern = %summary.pattern,
                primary = ?summary.primary,
                fallback = ?summary.fallback,
                "Invalidation failed on every tier"
            );
        }
    }
}

fn tier_outcome(result: Option<Result<Option<u64>, StorageError>>) -> TierOutcome {
    match result {
        Some(Ok(removed)) => TierOutcome::Completed { removed },
        Some(Err(e)) => TierOutcome::Failed { error: e.to_string() },
        None => TierOutcome::NotConfigured,
    }
}
