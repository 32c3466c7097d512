// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Learning Modules
//!
//! A learning module absorbs tracked patterns and contributes
//! recommendations. The coordinator keeps modules in a name-keyed registry
//! and never depends on a concrete type.
//!
//! Module hooks may fail; the coordinator logs the failure and carries on
//! with the remaining modules.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::{LearningContext, Recommendation};
use super::performance::PerformanceMetrics;
use super::pattern::{ContextMap, ExecutionPattern};

/// Learning lifecycle. Only ever advances one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningPhase {
    Initialization,
    PatternCollection,
    Analysis,
    Optimization,
    Application,
}

impl LearningPhase {
    pub fn next(self) -> Option<Self> {
        match self {
            LearningPhase::Initialization => Some(LearningPhase::PatternCollection),
            LearningPhase::PatternCollection => Some(LearningPhase::Analysis),
            LearningPhase::Analysis => Some(LearningPhase::Optimization),
            LearningPhase::Optimization => Some(LearningPhase::Application),
            LearningPhase::Application => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Initialization => "INITIALIZATION",
            LearningPhase::PatternCollection => "PATTERN_COLLECTION",
            LearningPhase::Analysis => "ANALYSIS",
            LearningPhase::Optimization => "OPTIMIZATION",
            LearningPhase::Application => "APPLICATION",
        }
    }
}

impl fmt::Display for LearningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a module, reported through coordinator status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub name: String,
    pub enabled: bool,
    pub phase: LearningPhase,
    pub patterns_learned: u64,
    #[serde(default)]
    pub details: ContextMap,
}

#[async_trait]
pub trait LearningModule: Send + Sync {
    /// Registry key. Must be stable for the lifetime of the module.
    fn name(&self) -> &str;

    async fn learn_from_execution(&self, pattern: &ExecutionPattern) -> Result<()>;

    async fn recommendations(&self, context: &LearningContext) -> Result<Vec<Recommendation>>;

    async fn update_performance_metrics(&self, metrics: &[PerformanceMetrics]) -> Result<()>;

    fn status(&self) -> ModuleStatus;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);
}
