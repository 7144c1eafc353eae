// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-visible errors.
//!
//! Logical misses and backend outages never show up here: a miss is `None`
//! and an outage is absorbed by failover. Only problems no fallback can fix
//! are surfaced.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be encoded, so no tier can store it
    #[error("failed to serialize value for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The invalidation pattern is empty or cannot be compiled
    #[error("invalid invalidation pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
