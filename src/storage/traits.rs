// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pattern::InvalidationPattern;
use crate::stats::CacheMetricsSnapshot;

/// Backend failure. Always transient from the caller's point of view: the
/// manager absorbs it by failing over.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("Circuit breaker open, request rejected")]
    Rejected,
}

impl StorageError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend",
            Self::Connection(_) => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Rejected => "rejected",
        }
    }
}

/// Which tier a backend plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Distributed,
    Local,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Distributed => "distributed",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform cache contract over both tiers.
///
/// Values are opaque bytes; encoding happens above this layer. `get`
/// distinguishes a logical miss (`Ok(None)`) from a failure (`Err`), which is
/// what lets the manager avoid failing over on a plain miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` for `ttl`, replacing any existing entry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError>;

    /// Remove one key. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key matching `pattern`, returning how many went.
    async fn delete_pattern(&self, pattern: &InvalidationPattern) -> Result<u64, StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Backend-reported counters, if the backend exposes any.
    async fn stats(&self) -> Result<Option<CacheMetricsSnapshot>, StorageError> {
        Ok(None)
    }
}
