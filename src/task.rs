// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic background tasks with an explicit stop.
//!
//! Used by the TTL sweeper, the manager's health probe and the monitor. Each
//! task body returns [`ControlFlow::Break`] to end the loop on its own (for
//! example when the weak reference to its owner no longer upgrades).

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a running periodic task. Dropping it also stops the task.
pub struct TaskHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TaskHandle {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task and wait for it to finish its current tick.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(task = self.name, error = %e, "Background task ended abnormally");
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Run `tick` every `interval`, first run one interval after spawning.
pub(crate) fn spawn_periodic<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if tick().await.is_break() {
                        break;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(task = name, "Background task stopped");
    });

    TaskHandle {
        name,
        shutdown: shutdown_tx,
        task: Some(task),
    }
}
