// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-backend health tracking.

use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::types::{BackendStatus, HealthState};
use crate::storage::BackendKind;

/// Health record for one backend, updated by every call outcome and probe.
pub(crate) struct BackendHealth {
    kind: BackendKind,
    status: RwLock<BackendStatus>,
}

impl BackendHealth {
    pub(crate) fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            status: RwLock::new(BackendStatus {
                kind,
                state: HealthState::Unknown,
                healthy: false,
                last_checked_at: None,
                last_error: None,
                consecutive_failures: 0,
            }),
        }
    }

    /// Permanently unhealthy: there is no backend behind this tier.
    pub(crate) fn not_configured(kind: BackendKind) -> Self {
        let health = Self::new(kind);
        {
            let mut status = health.status.write();
            status.state = HealthState::Unhealthy;
            status.last_error = Some("distributed backend not configured".into());
        }
        crate::metrics::set_backend_healthy(kind.as_str(), false);
        health
    }

    pub(crate) fn record_success(&self) {
        let previous = {
            let mut status = self.status.write();
            let previous = status.state;
            status.state = HealthState::Healthy;
            status.healthy = true;
            status.last_checked_at = Some(SystemTime::now());
            status.last_error = None;
            status.consecutive_failures = 0;
            previous
        };

        if previous != HealthState::Healthy {
            crate::metrics::set_backend_healthy(self.kind.as_str(), true);
            if previous == HealthState::Unhealthy {
                info!(tier = %self.kind, "Backend recovered");
            }
        }
    }

    pub(crate) fn record_failure(&self, error: impl Into<String>) {
        let error = error.into();
        let (previous, failures) = {
            let mut status = self.status.write();
            let previous = status.state;
            status.state = HealthState::Unhealthy;
            status.healthy = false;
            status.last_checked_at = Some(SystemTime::now());
            status.last_error = Some(error.clone());
            status.consecutive_failures += 1;
            (previous, status.consecutive_failures)
        };

        if previous != HealthState::Unhealthy {
            crate::metrics::set_backend_healthy(self.kind.as_str(), false);
            warn!(tier = %self.kind, error = %error, "Backend marked unhealthy");
        } else {
            tracing::debug!(tier = %self.kind, failures, error = %error, "Backend still unhealthy");
        }
    }

    pub(crate) fn status(&self) -> BackendStatus {
        self.status.read().clone()
    }

    #[cfg(test)]
    pub(crate) fn is_healthy(&self) -> bool {
        self.status.read().healthy
    }
}
