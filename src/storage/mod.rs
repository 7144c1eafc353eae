// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage tiers behind the [`CacheBackend`](traits::CacheBackend) contract.
//!
//! - [`memory::LocalCache`]: in-process DashMap store with per-entry TTL
//! - [`redis::RedisStore`]: distributed tier over a shared Redis

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::{CacheEntry, LocalCache};
pub use self::redis::RedisStore;
pub use traits::{BackendKind, CacheBackend, StorageError};
