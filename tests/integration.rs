// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration Tests against a real Redis
//!
//! Tests use testcontainers for portability, no external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//!
//! # Run only failure scenario tests
//! cargo test --test integration failure -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: round trips, TTL, SCAN invalidation, prefixes
//! - `failure_*` - Failure scenarios: Redis down at startup, Redis death mid-run

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use resilient_cache::storage::CacheBackend;
use resilient_cache::{
    CacheConfig, CacheManager, HealthState, InvalidationPattern, RedisStore, TierOutcome,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn redis_config(port: u16, prefix: &str) -> CacheConfig {
    CacheConfig {
        redis_url: Some(format!("redis://127.0.0.1:{port}")),
        redis_prefix: Some(prefix.to_string()),
        sweep_interval_secs: 0,
        health_check_interval_secs: 0,
        ..CacheConfig::default()
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Client {
    id: u32,
    name: String,
}

// =============================================================================
// Happy Path Tests - Normal Operation
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_roundtrip_through_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = CacheManager::connect(redis_config(port, "it:"))
        .await
        .expect("Failed to build manager");
    assert!(manager.has_primary());
    assert_eq!(manager.get_status().primary.state, HealthState::Healthy);

    assert!(manager.set("clients:1", b"acme", None).await);
    assert_eq!(manager.get("clients:1").await, Some(b"acme".to_vec()));
    assert_eq!(manager.get("clients:2").await, None);

    // Served by Redis, not copied locally
    assert!(manager.local().is_empty());

    let client = Client { id: 7, name: "Initech".into() };
    assert!(manager.set_json("clients:7", &client, None).await.unwrap());
    assert_eq!(manager.get_json::<Client>("clients:7").await, Some(client));

    assert!(manager.delete("clients:1").await);
    assert_eq!(manager.get("clients:1").await, None);

    let stats = manager.stats().await;
    assert_eq!(stats.fallback_reads, 0);
    assert_eq!(stats.primary_failures, 0);
    assert!(stats.average_primary_latency.is_some());
    assert!(stats.distributed.is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_redis_ttl_expires() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = CacheManager::connect(redis_config(port, "ttl:")).await.unwrap();
    assert!(manager.set("short", b"v", Some(Duration::from_millis(300))).await);
    assert!(manager.get("short").await.is_some());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(manager.get("short").await, None);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_delete_pattern_scans_all_keys() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = CacheManager::connect(redis_config(port, "scan:")).await.unwrap();

    // More keys than one SCAN batch
    for i in 0..1_200 {
        manager.set(&format!("clients:list:{i}"), b"x", None).await;
    }
    manager.set("clients:detail:1", b"x", None).await;

    let summary = manager.delete_pattern("clients:list:*").await.unwrap();
    assert_eq!(summary.primary, TierOutcome::Completed { removed: Some(1_200) });
    assert!(summary.fallback.is_completed());

    assert_eq!(manager.get("clients:list:5").await, None);
    assert!(manager.get("clients:detail:1").await.is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_glob_metacharacters_are_literal() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let store = RedisStore::new(&format!("redis://127.0.0.1:{port}"), Some("lit[x]:")).unwrap();
    let ttl = Duration::from_secs(60);
    store.set("tags[a]:1", b"x", ttl).await.unwrap();
    store.set("tagsa:1", b"x", ttl).await.unwrap();

    let removed = store
        .delete_pattern(&InvalidationPattern::new("tags[a]:*").unwrap())
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.get("tags[a]:1").await.unwrap().is_none());
    assert!(store.get("tagsa:1").await.unwrap().is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_single_char_wildcard_covers_multibyte_keys() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = CacheManager::connect(redis_config(port, "utf8:")).await.unwrap();
    for key in ["user:é", "user:a", "user:日", "user:ab"] {
        assert!(manager.set(key, b"x", None).await);
    }

    let summary = manager.delete_pattern("user:?").await.unwrap();
    assert_eq!(summary.primary, TierOutcome::Completed { removed: Some(3) });

    assert_eq!(manager.get("user:é").await, None);
    assert_eq!(manager.get("user:日").await, None);
    assert!(manager.get("user:ab").await.is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_prefix_isolates_clear() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let a = CacheManager::connect(redis_config(port, "app-a:")).await.unwrap();
    let b = CacheManager::connect(redis_config(port, "app-b:")).await.unwrap();
    a.set("k", b"a", None).await;
    b.set("k", b"b", None).await;

    let summary = a.clear().await;
    assert!(summary.primary.is_completed());

    assert_eq!(a.get("k").await, None);
    assert_eq!(b.get("k").await, Some(b"b".to_vec()));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_background_health_probe() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let config = CacheConfig {
        health_check_interval_secs: 1,
        ..redis_config(port, "probe:")
    };
    let manager = Arc::new(CacheManager::connect(config).await.unwrap());
    manager.start();
    assert!(manager.background_tasks_running());

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let status = manager.get_status();
    assert!(status.is_fully_healthy());

    manager.shutdown().await;
    assert!(!manager.background_tasks_running());
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
async fn failure_redis_unavailable_at_startup() {
    // Nothing listens on port 1
    let config = CacheConfig {
        redis_url: Some("redis://127.0.0.1:1".into()),
        ..CacheConfig::default()
    };

    let manager = CacheManager::connect(config)
        .await
        .expect("Startup must survive an unreachable Redis");

    assert!(manager.has_primary());
    let status = manager.get_status();
    assert_eq!(status.primary.state, HealthState::Unhealthy);
    assert!(status.fallback.healthy);

    assert!(manager.set("clients:1", b"acme", None).await);
    assert_eq!(manager.get("clients:1").await, Some(b"acme".to_vec()));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_dies_mid_operation() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let config = CacheConfig {
        circuit_breaker_enabled: false,
        ..redis_config(port, "dies:")
    };
    let manager = CacheManager::connect(config).await.unwrap();

    for i in 0..5 {
        assert!(manager.set(&format!("before-kill-{i}"), b"x", None).await);
    }
    assert!(manager.local().is_empty());

    // Kill Redis!
    drop(redis);
    tokio::time::sleep(Duration::from_millis(100)).await;

    for i in 0..5 {
        assert!(
            manager.set(&format!("after-kill-{i}"), b"y", None).await,
            "Writes must land locally with Redis gone"
        );
    }
    assert_eq!(manager.get("after-kill-2").await, Some(b"y".to_vec()));
    assert_eq!(manager.local().len(), 5);

    let status = manager.get_status();
    assert!(!status.primary.healthy);
    assert!(status.primary.consecutive_failures >= 6);

    // Invalidation still completes on the surviving tier
    let summary = manager.delete_pattern("after-kill-*").await.unwrap();
    assert!(matches!(summary.primary, TierOutcome::Failed { .. }));
    assert_eq!(summary.fallback, TierOutcome::Completed { removed: Some(5) });
}
