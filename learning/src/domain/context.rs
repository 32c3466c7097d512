// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Recommendation Queries
//!
//! A [`LearningContext`] describes the task the decision layer is about to
//! run. Its [`signature`](LearningContext::signature) is the cache key for
//! recommendation lookups: a SHA-256 over the task description, the current
//! pattern and the number of available tools, truncated to
//! [`SIGNATURE_LEN`] hex characters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::performance::PerformanceMetrics;
use super::pattern::{ContextMap, ExecutionPattern};

pub const SIGNATURE_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningContext {
    pub task_description: String,
    #[serde(default)]
    pub current_pattern: Option<String>,
    #[serde(default)]
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub user_preferences: ContextMap,
    #[serde(default)]
    pub performance_history: Vec<PerformanceMetrics>,
    #[serde(default)]
    pub session_data: ContextMap,
    pub timestamp: DateTime<Utc>,
}

impl LearningContext {
    pub fn new(task_description: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            current_pattern: None,
            available_tools: Vec::new(),
            user_preferences: ContextMap::new(),
            performance_history: Vec::new(),
            session_data: ContextMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_current_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.current_pattern = Some(pattern.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.task_description.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.current_pattern.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.available_tools.len().to_le_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(SIGNATURE_LEN);
        digest
    }
}

/// One ranked suggestion returned to the decision layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Strategy name (`ExecutionPattern::pattern_used`).
    pub pattern: String,
    pub confidence: f64,
    pub execution_time: f64,
    pub success_rate: f64,
    /// Module name, `"cache"` or `"persistent"`.
    pub source: String,
}

impl Recommendation {
    pub fn from_pattern(pattern: &ExecutionPattern, source: impl Into<String>) -> Self {
        Self {
            pattern: pattern.pattern_used.clone(),
            confidence: pattern.confidence_score,
            execution_time: pattern.execution_time,
            success_rate: pattern.success_rate,
            source: source.into(),
        }
    }
}
