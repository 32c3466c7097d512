// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Frequency Module
//!
//! Counts how often each strategy succeeded per task type and recommends the
//! strongest strategy for every task type named in the task description.
//!
//! A strategy's weight is its expected number of successes (the sum of
//! observed success rates). Confidence is the mean success rate scaled by
//! `n / (n + 1)`, so a single lucky observation never outranks a strategy
//! with a track record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{
    ContextValue, ExecutionPattern, LearningContext, LearningModule, LearningPhase, ModuleStatus,
    PerformanceMetrics, Recommendation,
};

pub const MODULE_NAME: &str = "pattern_frequency";

#[derive(Debug, Clone, Default)]
struct Tally {
    observations: u64,
    success_sum: f64,
    time_sum: f64,
}

impl Tally {
    fn mean_success(&self) -> f64 {
        self.success_sum / self.observations.max(1) as f64
    }

    fn mean_time(&self) -> f64 {
        self.time_sum / self.observations.max(1) as f64
    }

    fn confidence(&self) -> f64 {
        let n = self.observations as f64;
        (self.mean_success() * n / (n + 1.0)).clamp(0.0, 1.0)
    }
}

pub struct PatternFrequencyModule {
    enabled: AtomicBool,
    learned: AtomicU64,
    tallies: RwLock<HashMap<String, HashMap<String, Tally>>>,
}

impl PatternFrequencyModule {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            learned: AtomicU64::new(0),
            tallies: RwLock::new(HashMap::new()),
        }
    }

    /// Strongest strategy recorded for `task_type`.
    pub fn best_strategy(&self, task_type: &str) -> Option<Recommendation> {
        let tallies = self.tallies.read();
        let strategies = tallies.get(task_type)?;
        strategies
            .iter()
            .max_by(|(a_name, a), (b_name, b)| {
                a.success_sum
                    .total_cmp(&b.success_sum)
                    .then_with(|| b_name.cmp(a_name))
            })
            .map(|(name, tally)| Recommendation {
                pattern: name.clone(),
                confidence: tally.confidence(),
                execution_time: tally.mean_time(),
                success_rate: tally.mean_success(),
                source: MODULE_NAME.to_string(),
            })
    }
}

impl Default for PatternFrequencyModule {
    fn default() -> Self {
        Self::new()
    }
}

/// `code_analysis` matches "code_analysis" and "code analysis".
fn mentions(description: &str, task_type: &str) -> bool {
    let task_type = task_type.to_lowercase();
    description.contains(&task_type) || description.contains(&task_type.replace('_', " "))
}

#[async_trait]
impl LearningModule for PatternFrequencyModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn learn_from_execution(&self, pattern: &ExecutionPattern) -> Result<()> {
        {
            let mut tallies = self.tallies.write();
            let tally = tallies
                .entry(pattern.task_type.clone())
                .or_default()
                .entry(pattern.pattern_used.clone())
                .or_default();
            tally.observations += 1;
            tally.success_sum += pattern.success_rate;
            tally.time_sum += pattern.execution_time;
        }
        self.learned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recommendations(&self, context: &LearningContext) -> Result<Vec<Recommendation>> {
        let description = context.task_description.to_lowercase();
        let task_types: Vec<String> = self
            .tallies
            .read()
            .keys()
            .filter(|task_type| mentions(&description, task_type))
            .cloned()
            .collect();

        let mut recommendations: Vec<Recommendation> = task_types
            .iter()
            .filter_map(|task_type| self.best_strategy(task_type))
            .collect();
        recommendations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(recommendations)
    }

    async fn update_performance_metrics(&self, _metrics: &[PerformanceMetrics]) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        let learned = self.learned.load(Ordering::Relaxed);
        let (task_types, strategies) = {
            let tallies = self.tallies.read();
            (tallies.len(), tallies.values().map(HashMap::len).sum::<usize>())
        };

        let mut status = ModuleStatus {
            name: MODULE_NAME.to_string(),
            enabled: self.is_enabled(),
            phase: if learned == 0 {
                LearningPhase::Initialization
            } else {
                LearningPhase::PatternCollection
            },
            patterns_learned: learned,
            details: Default::default(),
        };
        status.details.insert("task_types".into(), ContextValue::Integer(task_types as i64));
        status.details.insert("strategies".into(), ContextValue::Integer(strategies as i64));
        status
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}
