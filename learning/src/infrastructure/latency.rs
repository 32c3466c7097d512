// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rolling window of recent operation latencies.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW: usize = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub average_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Keeps the most recent `capacity` samples, in milliseconds.
pub struct LatencyWindow {
    capacity: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn summary(&self) -> LatencySummary {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return LatencySummary::default();
        }
        LatencySummary {
            samples: samples.len(),
            average_ms: samples.iter().sum::<f64>() / samples.len() as f64,
            max_ms: samples.iter().copied().fold(0.0, f64::max),
            last_ms: samples.back().copied().unwrap_or_default(),
        }
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
