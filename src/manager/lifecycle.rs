// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background work owned by the manager: the TTL sweeper and the periodic
//! health probe.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use super::{CacheManager, ManagerState};
use crate::task::{spawn_periodic, TaskHandle};

#[derive(Default)]
pub(crate) struct BackgroundTasks {
    sweeper: Option<TaskHandle>,
    health_probe: Option<TaskHandle>,
}

impl BackgroundTasks {
    fn take_all(&mut self) -> Vec<TaskHandle> {
        self.sweeper
            .take()
            .into_iter()
            .chain(self.health_probe.take())
            .collect()
    }
}

impl CacheManager {
    /// Launch the sweeper and health probe. Calling it on a running manager
    /// does nothing.
    #[tracing::instrument(skip(self))]
    pub fn start(self: &Arc<Self>) {
        if self.state() == ManagerState::Running {
            return;
        }

        let mut tasks = self.tasks.lock();

        if let Some(interval) = self.config.sweep_interval() {
            tasks.sweeper = Some(self.local.start_sweeper(interval));
        }

        if let Some(interval) = self.config.health_check_interval() {
            let manager: Weak<Self> = Arc::downgrade(self);
            tasks.health_probe = Some(spawn_periodic("health_probe", interval, move || {
                let manager = manager.clone();
                async move {
                    let Some(manager) = manager.upgrade() else {
                        return ControlFlow::Break(());
                    };
                    let status = manager.health_check().await;
                    if !status.fallback.healthy {
                        warn!(error = ?status.fallback.last_error, "Local cache failed its self-test");
                    }
                    ControlFlow::Continue(())
                }
            }));
        }

        self.set_state(ManagerState::Running);
        info!(
            sweeper = tasks.sweeper.is_some(),
            health_probe = tasks.health_probe.is_some(),
            "Cache manager started"
        );
    }

    /// Stop background tasks and wait for them. The cache stays usable.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        if matches!(self.state(), ManagerState::ShuttingDown | ManagerState::Stopped) {
            return;
        }
        self.set_state(ManagerState::ShuttingDown);
        info!("Shutting down cache manager...");

        let handles = self.tasks.lock().take_all();
        for handle in handles {
            handle.stop().await;
        }

        self.set_state(ManagerState::Stopped);
        info!("Cache manager stopped");
    }

    /// Whether the sweeper and health probe (if enabled) are alive.
    #[must_use]
    pub fn background_tasks_running(&self) -> bool {
        let tasks = self.tasks.lock();
        let alive = |task: &Option<TaskHandle>| task.as_ref().map_or(true, TaskHandle::is_running);
        self.state() == ManagerState::Running && alive(&tasks.sweeper) && alive(&tasks.health_probe)
    }
}
