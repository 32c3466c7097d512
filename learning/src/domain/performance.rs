// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Historical performance measurements reported by components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::ContextMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub component_name: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub baseline_value: f64,
    pub improvement_percentage: f64,
    pub sample_count: u32,
    /// `(lower, upper)` bounds, when the reporter computed them.
    #[serde(default)]
    pub confidence_interval: Option<(f64, f64)>,
    pub measured_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: ContextMap,
}

impl PerformanceMetrics {
    pub fn new(
        component_name: impl Into<String>,
        metric_name: impl Into<String>,
        metric_value: f64,
        baseline_value: f64,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            metric_name: metric_name.into(),
            metric_value,
            baseline_value,
            improvement_percentage: improvement_percentage(metric_value, baseline_value),
            sample_count: 1,
            confidence_interval: None,
            measured_at: Utc::now(),
            metadata: ContextMap::new(),
        }
    }

    pub fn with_samples(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_confidence_interval(mut self, lower: f64, upper: f64) -> Self {
        self.confidence_interval = Some((lower, upper));
        self
    }

    pub fn measured_at(mut self, at: DateTime<Utc>) -> Self {
        self.measured_at = at;
        self
    }
}

/// `(value - baseline) / baseline * 100`; a zero baseline yields 0.
pub fn improvement_percentage(value: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (value - baseline) / baseline * 100.0
}
