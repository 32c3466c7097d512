// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Performance Trend Module
//!
//! Keeps an exponentially weighted average of success rate and execution
//! time per strategy. Reported performance metrics nudge a strategy's score
//! when their metadata names it under the `pattern` key:
//!
//! ```text
//! adjustment += improvement_percentage / 100 * METRIC_WEIGHT   (clamped to ±MAX_ADJUSTMENT)
//! ```
//!
//! Recommendations are the strategies scoring above the current one, best
//! first; without a current strategy the top strategies are returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{
    ContextValue, ExecutionPattern, LearningContext, LearningModule, LearningPhase, ModuleStatus,
    PerformanceMetrics, Recommendation,
};

pub const MODULE_NAME: &str = "performance_trend";

pub const DEFAULT_SMOOTHING: f64 = 0.2;
const METRIC_WEIGHT: f64 = 0.1;
const MAX_ADJUSTMENT: f64 = 0.2;
const MAX_RECOMMENDATIONS: usize = 3;

#[derive(Debug, Clone)]
struct Trend {
    samples: u64,
    success_rate: f64,
    execution_time: f64,
    adjustment: f64,
}

impl Trend {
    fn score(&self) -> f64 {
        (self.success_rate + self.adjustment).clamp(0.0, 1.0)
    }

    fn recommendation(&self, strategy: &str) -> Recommendation {
        let n = self.samples as f64;
        Recommendation {
            pattern: strategy.to_string(),
            confidence: self.score() * n / (n + 1.0),
            execution_time: self.execution_time,
            success_rate: self.success_rate,
            source: MODULE_NAME.to_string(),
        }
    }
}

pub struct PerformanceTrendModule {
    smoothing: f64,
    enabled: AtomicBool,
    learned: AtomicU64,
    metrics_applied: AtomicU64,
    trends: RwLock<HashMap<String, Trend>>,
}

impl PerformanceTrendModule {
    pub fn new() -> Self {
        Self::with_smoothing(DEFAULT_SMOOTHING)
    }

    /// `smoothing` is the weight of the newest observation, clamped to `(0, 1]`.
    pub fn with_smoothing(smoothing: f64) -> Self {
        Self {
            smoothing: if smoothing.is_finite() { smoothing.clamp(f64::EPSILON, 1.0) } else { DEFAULT_SMOOTHING },
            enabled: AtomicBool::new(true),
            learned: AtomicU64::new(0),
            metrics_applied: AtomicU64::new(0),
            trends: RwLock::new(HashMap::new()),
        }
    }

    /// Smoothed `(success_rate, execution_time)` for a strategy.
    pub fn trend(&self, strategy: &str) -> Option<(f64, f64)> {
        self.trends
            .read()
            .get(strategy)
            .map(|t| (t.success_rate, t.execution_time))
    }
}

impl Default for PerformanceTrendModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LearningModule for PerformanceTrendModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn learn_from_execution(&self, pattern: &ExecutionPattern) -> Result<()> {
        let alpha = self.smoothing;
        {
            let mut trends = self.trends.write();
            trends
                .entry(pattern.pattern_used.clone())
                .and_modify(|t| {
                    t.samples += 1;
                    t.success_rate += alpha * (pattern.success_rate - t.success_rate);
                    t.execution_time += alpha * (pattern.execution_time - t.execution_time);
                })
                .or_insert_with(|| Trend {
                    samples: 1,
                    success_rate: pattern.success_rate,
                    execution_time: pattern.execution_time,
                    adjustment: 0.0,
                });
        }
        self.learned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recommendations(&self, context: &LearningContext) -> Result<Vec<Recommendation>> {
        let trends = self.trends.read();
        let floor = context
            .current_pattern
            .as_deref()
            .and_then(|current| trends.get(current))
            .map(Trend::score);

        let mut recommendations: Vec<Recommendation> = trends
            .iter()
            .filter(|(name, trend)| {
                Some(name.as_str()) != context.current_pattern.as_deref()
                    && floor.map_or(true, |floor| trend.score() > floor)
            })
            .map(|(name, trend)| trend.recommendation(name))
            .collect();
        drop(trends);

        recommendations.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.pattern.cmp(&b.pattern))
        });
        recommendations.truncate(MAX_RECOMMENDATIONS);
        Ok(recommendations)
    }

    async fn update_performance_metrics(&self, metrics: &[PerformanceMetrics]) -> Result<()> {
        let mut applied = 0;
        {
            let mut trends = self.trends.write();
            for metric in metrics {
                let Some(strategy) = metric.metadata.get("pattern").and_then(ContextValue::as_str) else {
                    continue;
                };
                if let Some(trend) = trends.get_mut(strategy) {
                    let delta = metric.improvement_percentage / 100.0 * METRIC_WEIGHT;
                    if delta.is_finite() {
                        trend.adjustment = (trend.adjustment + delta).clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
                        applied += 1;
                    }
                }
            }
        }
        self.metrics_applied.fetch_add(applied, Ordering::Relaxed);
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        let learned = self.learned.load(Ordering::Relaxed);
        let metrics_applied = self.metrics_applied.load(Ordering::Relaxed);
        let phase = match (learned, metrics_applied) {
            (0, _) => LearningPhase::Initialization,
            (_, 0) => LearningPhase::PatternCollection,
            _ => LearningPhase::Analysis,
        };

        let mut status = ModuleStatus {
            name: MODULE_NAME.to_string(),
            enabled: self.is_enabled(),
            phase,
            patterns_learned: learned,
            details: Default::default(),
        };
        status.details.insert(
            "strategies".into(),
            ContextValue::Integer(self.trends.read().len() as i64),
        );
        status.details.insert("metrics_applied".into(), ContextValue::Integer(metrics_applied as i64));
        status.details.insert("smoothing".into(), ContextValue::Number(self.smoothing));
        status
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}
