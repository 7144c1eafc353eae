// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

/// Samples kept for the rolling average.
pub(crate) const LATENCY_WINDOW: usize = 1024;

/// Sliding window of recent distributed-call latencies.
pub(crate) struct LatencyWindow {
    samples: Mutex<VecDeque<Duration>>,
    capacity: usize,
}

impl LatencyWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn record(&self, sample: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Mean of the window, `None` before the first sample.
    pub(crate) fn average(&self) -> Option<Duration> {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.samples.lock().len()
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(LATENCY_WINDOW)
    }
}
