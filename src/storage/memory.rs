// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process cache tier.
//!
//! A sharded [`DashMap`] keyed by cache key, each entry carrying its own
//! expiry. Reads and writes to different keys only contend when they land on
//! the same shard; writes to one key are serialized by that shard's lock, so
//! the last `set` to complete wins.
//!
//! Expired entries are never returned. They are dropped lazily when a read
//! trips over them and in bulk by the [sweeper](LocalCache::start_sweeper),
//! which walks the map shard by shard and removes in small batches.
//!
//! Nothing here fails in normal operation: problems surface as `false` or
//! `None`, never as a panic, so the manager's fallback path stays safe.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::{BackendKind, CacheBackend, StorageError};
use crate::config::CacheConfig;
use crate::metrics::LatencyTimer;
use crate::pattern::InvalidationPattern;
use crate::stats::{CacheCounters, CacheMetricsSnapshot};
use crate::task::{spawn_periodic, TaskHandle};

/// Upper bound on a single entry's lifetime.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

const HEALTH_SENTINEL_PREFIX: &str = "__resilient_cache__:health:";

/// A stored value and its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Expired from the instant `now` reaches `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry (zero once expired).
    #[must_use]
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

pub struct LocalCache {
    entries: DashMap<String, CacheEntry>,
    counters: Arc<CacheCounters>,
    default_ttl: Duration,
    sentinel_ttl: Duration,
    sweep_batch_size: usize,
    probe_seq: AtomicU64,
}

impl LocalCache {
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            counters: Arc::new(CacheCounters::new()),
            default_ttl,
            sentinel_ttl: Duration::from_secs(5),
            sweep_batch_size: 256,
            probe_seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            sentinel_ttl: config.sentinel_ttl(),
            sweep_batch_size: config.sweep_batch_size.max(1),
            ..Self::new(config.default_ttl())
        }
    }

    /// Use an externally owned counter set.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<CacheCounters>) -> Self {
        self.counters = counters;
        self
    }

    #[must_use]
    pub fn counters(&self) -> Arc<CacheCounters> {
        Arc::clone(&self.counters)
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of held entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value for `key` if present and unexpired. Counts a hit or a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.lookup(key);
        if value.is_some() {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        value
    }

    /// Remaining TTL of a live entry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.remaining_ttl(now))
    }

    /// Store `value` under `key`, replacing any existing entry. `None` or a
    /// zero TTL means the default TTL.
    pub fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        let ttl = match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        };
        self.insert_entry(key, value.to_vec(), ttl)
    }

    /// Remove `key`. Succeeds whether or not it existed.
    pub fn delete(&self, key: &str) -> bool {
        if let Some(entry) = self.take(key) {
            if entry.is_expired(Instant::now()) {
                self.record_expiration(key);
            } else {
                self.counters.record_invalidations(1);
            }
        }
        true
    }

    /// Remove every key matching `pattern`; returns how many were removed.
    ///
    /// Matching keys are collected under per-shard read locks, then removed
    /// one by one, so writers are never blocked for the whole scan.
    pub fn delete_pattern(&self, pattern: &InvalidationPattern) -> usize {
        if pattern.is_literal() {
            let removed = usize::from(self.take(pattern.as_str()).is_some());
            self.counters.record_invalidations(removed as u64);
            return removed;
        }

        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| pattern.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = matching
            .iter()
            .filter(|key| self.take(key).is_some())
            .count();

        self.counters.record_invalidations(removed as u64);
        debug!(pattern = %pattern, removed, "Local pattern invalidation");
        removed
    }

    /// Remove everything.
    pub fn clear(&self) -> bool {
        let counters = &self.counters;
        let mut removed = 0u64;
        self.entries.retain(|key, entry| {
            counters.remove_footprint(key.len(), entry.value.len());
            removed += 1;
            false
        });
        counters.record_invalidations(removed);
        crate::metrics::set_local_cache_items(0);
        true
    }

    /// Self-test: write a sentinel, read it back, delete it.
    ///
    /// Only `true` when the value read back is byte-identical and the entry
    /// could be removed again. Traffic counters are left untouched.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        let seq = self.probe_seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{HEALTH_SENTINEL_PREFIX}{seq}");
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let expected = format!("ok:{seq}:{stamp}").into_bytes();

        if !self.insert_entry(&key, expected.clone(), self.sentinel_ttl) {
            return false;
        }
        let read_back = self.lookup(&key);
        let removed = self.take(&key).is_some();

        let healthy = removed && read_back.as_deref() == Some(expected.as_slice());
        if !healthy {
            warn!(sentinel = %key, "Local cache self-test failed");
        }
        healthy
    }

    /// Current counters plus live key count.
    #[must_use]
    pub fn stats(&self) -> CacheMetricsSnapshot {
        let snapshot = self.counters.snapshot(self.entries.len() as u64);
        crate::metrics::set_local_cache_items(self.entries.len());
        crate::metrics::set_local_cache_bytes(snapshot.footprint_bytes());
        snapshot
    }

    /// Remove expired entries, yielding to the scheduler between batches.
    pub async fn sweep_expired(&self) -> usize {
        let _timer = LatencyTimer::new("local", "sweep");
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for batch in expired.chunks(self.sweep_batch_size) {
            removed += batch
                .iter()
                .filter(|key| self.evict_if_expired(key, now))
                .count();
            tokio::task::yield_now().await;
        }

        if removed > 0 {
            crate::metrics::set_local_cache_items(self.entries.len());
        }
        removed
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until the
    /// returned handle is stopped or dropped.
    ///
    /// The task holds only a weak reference, so it also ends once the cache
    /// itself is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> TaskHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        spawn_periodic("ttl_sweeper", interval, move || {
            let cache = cache.clone();
            async move {
                let Some(cache) = cache.upgrade() else {
                    return ControlFlow::Break(());
                };
                let removed = cache.sweep_expired().await;
                if removed > 0 {
                    debug!(removed, "TTL sweep evicted expired entries");
                }
                ControlFlow::Continue(())
            }
        })
    }

    fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let found = self.entries.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.evict_if_expired(key, now);
                None
            }
            None => None,
        }
    }

    fn insert_entry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl.min(MAX_TTL)) else {
            warn!(key, ?ttl, "Rejecting local write: expiry out of range");
            return false;
        };

        let value_len = value.len();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at,
        };

        // Footprint is adjusted under the shard lock so it can't drift
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(entry);
                self.counters.remove_footprint(0, previous.value.len());
                self.counters.add_footprint(0, value_len);
            }
            Entry::Vacant(vacant) => {
                self.counters.add_footprint(key.len(), value_len);
                vacant.insert(entry);
            }
        }
        true
    }

    fn take(&self, key: &str) -> Option<CacheEntry> {
        let (key, entry) = self.entries.remove(key)?;
        self.counters.remove_footprint(key.len(), entry.value.len());
        Some(entry)
    }

    fn evict_if_expired(&self, key: &str, now: Instant) -> bool {
        match self.entries.remove_if(key, |_, entry| entry.is_expired(now)) {
            Some((key, entry)) => {
                self.counters.remove_footprint(key.len(), entry.value.len());
                self.record_expiration(&key);
                true
            }
            None => false,
        }
    }

    // Lazy and swept evictions both land here.
    fn record_expiration(&self, key: &str) {
        self.counters.record_expiration(key);
        crate::metrics::record_expirations(1);
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(CacheConfig::default().default_ttl())
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(LocalCache::get(self, key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        if LocalCache::set(self, key, value, Some(ttl)) {
            Ok(())
        } else {
            Err(StorageError::Backend(format!("local store rejected write for '{key}'")))
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        LocalCache::delete(self, key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &InvalidationPattern) -> Result<u64, StorageError> {
        Ok(LocalCache::delete_pattern(self, pattern) as u64)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        LocalCache::clear(self);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.is_healthy() {
            Ok(())
        } else {
            Err(StorageError::Backend("local cache self-test failed".into()))
        }
    }

    async fn stats(&self) -> Result<Option<CacheMetricsSnapshot>, StorageError> {
        Ok(Some(LocalCache::stats(self)))
    }
}
