// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Self-diagnosis for the cache.
//!
//! The [`CacheMonitor`] reads the manager's counters, health and latency and
//! turns them into prioritized [`Recommendation`]s. It never fails: a rule
//! without usable data simply stays silent.
//!
//! ```rust,no_run
//! use resilient_cache::{CacheConfig, CacheManager, CacheMonitor, Priority};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CacheManager::local_only(CacheConfig::default())?;
//! let monitor = CacheMonitor::from_config(manager.config());
//!
//! let report = monitor.report(&manager);
//! for rec in report.by_priority.get(&Priority::High).into_iter().flatten() {
//!     println!("{}: {}", rec.category, rec.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod rules;
mod types;

pub use rules::{MonitorInput, MonitorThresholds};
pub use types::{Priority, Recommendation, RecommendationCategory, RecommendationReport};

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::manager::CacheManager;
use crate::task::{spawn_periodic, TaskHandle};

#[derive(Debug, Clone, Default)]
pub struct CacheMonitor {
    thresholds: MonitorThresholds,
}

impl CacheMonitor {
    #[must_use]
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(MonitorThresholds::from_config(config))
    }

    #[must_use]
    pub fn thresholds(&self) -> &MonitorThresholds {
        &self.thresholds
    }

    /// Gather the rule input from a manager. No I/O.
    #[must_use]
    pub fn collect(&self, manager: &CacheManager) -> MonitorInput {
        MonitorInput {
            metrics: manager.combined_snapshot(),
            status: manager.get_status(),
            average_latency: manager.average_primary_latency(),
        }
    }

    /// Run the rules over an explicit input.
    #[must_use]
    pub fn evaluate(&self, input: &MonitorInput) -> Vec<Recommendation> {
        rules::evaluate(input, &self.thresholds)
    }

    /// Current recommendations for `manager`.
    #[must_use]
    pub fn recommendations(&self, manager: &CacheManager) -> Vec<Recommendation> {
        self.evaluate(&self.collect(manager))
    }

    /// Current recommendations, sorted, grouped and scored.
    #[must_use]
    pub fn report(&self, manager: &CacheManager) -> RecommendationReport {
        let report = RecommendationReport::new(self.recommendations(manager));
        publish_metrics(&report);
        report
    }

    /// Evaluate every `interval` and publish each report on the returned
    /// handle's channel. HIGH findings are logged at warn.
    pub fn spawn(self, manager: &Arc<CacheManager>, interval: Duration) -> MonitorHandle {
        let (report_tx, report_rx) = watch::channel(None);
        let report_tx = Arc::new(report_tx);
        let manager: Weak<CacheManager> = Arc::downgrade(manager);
        let monitor = Arc::new(self);

        let task = spawn_periodic("cache_monitor", interval, move || {
            let manager = manager.clone();
            let monitor = Arc::clone(&monitor);
            let report_tx = Arc::clone(&report_tx);
            async move {
                let Some(manager) = manager.upgrade() else {
                    return ControlFlow::Break(());
                };
                let report = monitor.report(&manager);
                for rec in report.by_priority.get(&Priority::High).into_iter().flatten() {
                    warn!(
                        category = %rec.category,
                        message = %rec.message,
                        action = %rec.suggested_action,
                        "Cache recommendation"
                    );
                }
                debug!(
                    recommendations = report.recommendations.len(),
                    impact_score = report.impact_score,
                    "Cache monitor evaluated"
                );
                let _ = report_tx.send(Some(report));
                ControlFlow::Continue(())
            }
        });

        MonitorHandle { task, report_rx }
    }
}

fn publish_metrics(report: &RecommendationReport) {
    for priority in [Priority::High, Priority::Medium, Priority::Low] {
        crate::metrics::set_recommendations(priority.as_str(), report.count(priority));
    }
    crate::metrics::set_impact_score(report.impact_score);
}

/// A running periodic monitor.
pub struct MonitorHandle {
    task: TaskHandle,
    report_rx: watch::Receiver<Option<RecommendationReport>>,
}

impl MonitorHandle {
    /// The most recent report, `None` before the first evaluation.
    #[must_use]
    pub fn latest(&self) -> Option<RecommendationReport> {
        self.report_rx.borrow().clone()
    }

    /// Watch for new reports.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<RecommendationReport>> {
        self.report_rx.clone()
    }

    pub async fn stop(self) {
        self.task.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_local_only_manager() {
        let manager = CacheManager::local_only(CacheConfig::default()).unwrap();
        let monitor = CacheMonitor::from_config(manager.config());

        // No reads yet, only the missing distributed tier is worth reporting
        let recs = monitor.recommendations(&manager);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].category, RecommendationCategory::Connection);
    }

    #[tokio::test]
    async fn test_report_reflects_traffic() {
        let manager = CacheManager::local_only(CacheConfig::default()).unwrap();
        manager.set("clients:1", b"x", None).await;
        for _ in 0..4 {
            let _ = manager.get("clients:1").await;
        }
        for i in 0..6 {
            let _ = manager.get(&format!("clients:missing:{i}")).await;
        }

        let report = CacheMonitor::default().report(&manager);
        assert_eq!(report.count(Priority::High), 2);
        assert!(report.by_category.contains_key(&RecommendationCategory::HitRate));
        assert_eq!(report.impact_score, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_publishes() {
        let manager = Arc::new(CacheManager::local_only(CacheConfig::default()).unwrap());
        let handle = CacheMonitor::default().spawn(&manager, Duration::from_secs(5));
        let mut reports = handle.subscribe();
        assert!(handle.latest().is_none());

        reports.changed().await.unwrap();
        let report = handle.latest().unwrap();
        assert_eq!(report.count(Priority::High), 1);

        handle.stop().await;
    }
}
