// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the learning bounded context
//! Published by the coordinator for observability; nothing depends on delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::module::LearningPhase;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearningEvent {
    /// A pattern landed in the hot cache
    PatternTracked {
        pattern_id: String,
        task_type: String,
        pattern_used: String,
        usage_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// A module hook returned an error; other modules were unaffected
    ModuleFailed {
        module: String,
        operation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The coordinator moved to the next learning phase
    PhaseAdvanced {
        from: LearningPhase,
        to: LearningPhase,
        patterns_learned: u64,
        timestamp: DateTime<Utc>,
    },

    /// Write-through to the durable store failed
    PersistenceFailed {
        pattern_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A maintenance cycle removed stale patterns
    PatternsPruned {
        durable: u64,
        cached: usize,
        min_confidence: f64,
        timestamp: DateTime<Utc>,
    },
}

impl LearningEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LearningEvent::PatternTracked { timestamp, .. } => *timestamp,
            LearningEvent::ModuleFailed { timestamp, .. } => *timestamp,
            LearningEvent::PhaseAdvanced { timestamp, .. } => *timestamp,
            LearningEvent::PersistenceFailed { timestamp, .. } => *timestamp,
            LearningEvent::PatternsPruned { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            LearningEvent::PatternTracked { .. } => "pattern_tracked",
            LearningEvent::ModuleFailed { .. } => "module_failed",
            LearningEvent::PhaseAdvanced { .. } => "phase_advanced",
            LearningEvent::PersistenceFailed { .. } => "persistence_failed",
            LearningEvent::PatternsPruned { .. } => "patterns_pruned",
        }
    }
}
