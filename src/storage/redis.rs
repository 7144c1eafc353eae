// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis-backed distributed cache tier.
//!
//! Values are stored as plain Redis strings with a millisecond expiry
//! (`SET key value PX ttl`). The connection is opened lazily on first use and
//! then held by a [`ConnectionManager`], which reconnects on its own after a
//! dropped link. Nothing in here imposes a timeout: the manager wraps every
//! call in its own deadline.
//!
//! An optional key prefix namespaces everything this store touches, which is
//! what lets `clear` leave other tenants of a shared Redis alone:
//!
//! ```rust,no_run
//! # use resilient_cache::storage::RedisStore;
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Keys land as "myapp:clients:list:A"
//! let store = RedisStore::new("redis://localhost:6379", Some("myapp:"))?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{cmd, Client, RedisError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::traits::{BackendKind, CacheBackend, StorageError};
use crate::pattern::{escape_redis_glob, InvalidationPattern};
use crate::resilience::retry::{retry, RetryConfig};
use crate::stats::CacheMetricsSnapshot;

/// Keys fetched per `SCAN` round trip.
const DEFAULT_SCAN_COUNT: u64 = 500;

pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    /// Optional key prefix (e.g. "myapp:" → "myapp:clients:list:A")
    prefix: String,
    scan_count: u64,
}

impl RedisStore {
    /// Validate the URL and prepare a client. No connection is made yet.
    pub fn new(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(format!("Invalid Redis URL: {e}")))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            prefix: prefix.unwrap_or("").to_string(),
            scan_count: DEFAULT_SCAN_COUNT,
        })
    }

    #[must_use]
    pub fn with_scan_count(mut self, count: u64) -> Self {
        self.scan_count = count.max(1);
        self
    }

    /// Establish the connection up front, retrying with backoff.
    ///
    /// Each attempt is capped at `attempt_timeout`. Failure here is not fatal
    /// for the caller; operations will try to connect again on demand.
    pub async fn warm_up(
        &self,
        config: &RetryConfig,
        attempt_timeout: Duration,
    ) -> Result<(), StorageError> {
        retry("redis_connect", config, || async {
            match tokio::time::timeout(attempt_timeout, self.conn()).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(StorageError::Timeout {
                    operation: "connect",
                    timeout: attempt_timeout,
                }),
            }
        })
        .await?;

        info!(prefix = %self.prefix, "Connected to Redis");
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    async fn conn(&self) -> Result<ConnectionManager, StorageError> {
        self.connection
            .get_or_try_init(|| async {
                debug!("Opening Redis connection");
                // Startup retries happen in warm_up
                let config = ConnectionManagerConfig::new().set_number_of_retries(1);
                ConnectionManager::new_with_config(self.client.clone(), config)
                    .await
                    .map_err(map_redis_error)
            })
            .await
            .cloned()
    }

    /// SCAN for `glob` and DEL every hit, keeping only keys accepted by
    /// `filter` when one is given. Returns the number deleted.
    async fn delete_matching(
        &self,
        glob: &str,
        filter: Option<&InvalidationPattern>,
    ) -> Result<u64, StorageError> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<Vec<u8>>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(glob)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            let keys = match filter {
                Some(pattern) => self.retain_matching(keys, pattern),
                None => keys,
            };
            if !keys.is_empty() {
                let removed: u64 = cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(deleted)
    }

    /// Keep raw Redis keys whose unprefixed form matches `pattern`. Keys that
    /// are not UTF-8 can't have been written by us and never match.
    fn retain_matching(&self, keys: Vec<Vec<u8>>, pattern: &InvalidationPattern) -> Vec<Vec<u8>> {
        keys.into_iter()
            .filter(|raw| {
                raw.strip_prefix(self.prefix.as_bytes())
                    .and_then(|key| std::str::from_utf8(key).ok())
                    .is_some_and(|key| pattern.is_match(key))
            })
            .collect()
    }
}

#[async_trait]
impl CacheBackend for RedisStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = cmd("GET")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        // PX rejects 0
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let _: u64 = cmd("DEL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &InvalidationPattern) -> Result<u64, StorageError> {
        if pattern.is_literal() {
            let mut conn = self.conn().await?;
            let removed: u64 = cmd("DEL")
                .arg(self.prefixed_key(pattern.as_str()))
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            return Ok(removed);
        }

        let glob = format!("{}{}", escape_redis_glob(&self.prefix), pattern.to_redis_glob());
        let filter = (!pattern.glob_is_exact()).then_some(pattern);
        let removed = self.delete_matching(&glob, filter).await?;
        debug!(pattern = %pattern, glob = %glob, removed, "Redis pattern invalidation");
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        if self.prefix.is_empty() {
            let mut conn = self.conn().await?;
            let _: () = cmd("FLUSHDB")
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
        } else {
            let glob = format!("{}*", escape_redis_glob(&self.prefix));
            self.delete_matching(&glob, None).await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let reply: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StorageError::Backend(format!("unexpected PING reply: {reply}")))
        }
    }

    /// Server-wide counters from `INFO`. These cover the whole Redis
    /// database, not just this store's prefix.
    async fn stats(&self) -> Result<Option<CacheMetricsSnapshot>, StorageError> {
        let mut conn = self.conn().await?;
        let info_stats: String = cmd("INFO")
            .arg("stats")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        let info_memory: String = cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        let keys: u64 = cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(Some(CacheMetricsSnapshot {
            hits: parse_info_field(&info_stats, "keyspace_hits").unwrap_or(0),
            misses: parse_info_field(&info_stats, "keyspace_misses").unwrap_or(0),
            keys,
            key_size_bytes: 0,
            value_size_bytes: parse_info_field(&info_memory, "used_memory").unwrap_or(0),
            expirations: parse_info_field(&info_stats, "expired_keys").unwrap_or(0),
            invalidations: 0,
            expirations_by_namespace: Default::default(),
        }))
    }
}

fn map_redis_error(e: RedisError) -> StorageError {
    if e.is_timeout() {
        StorageError::Connection(format!("timed out: {e}"))
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StorageError::Connection(e.to_string())
    } else {
        StorageError::Backend(e.to_string())
    }
}

/// Read a numeric `field:value` line out of an `INFO` reply.
fn parse_info_field(info: &str, field: &str) -> Option<u64> {
    info.lines().find_map(|line| {
        let (name, value) = line.trim().split_once(':')?;
        if name == field {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
