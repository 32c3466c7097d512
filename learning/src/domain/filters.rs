// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Queries
//!
//! [`PatternFilters`] is the single description of a pattern query. The
//! SQLite store translates it into SQL; [`PatternFilters::apply`] evaluates
//! the same predicate and ordering in memory. Both order by confidence
//! descending, then success rate descending, then id ascending, and page
//! with `offset`/`limit`. A non-positive `limit` selects nothing.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::pattern::ExecutionPattern;

pub const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternFilters {
    /// Matches `ExecutionPattern::pattern_used`.
    pub pattern_type: Option<String>,
    pub task_type: Option<String>,
    pub min_confidence: Option<f64>,
    pub min_success_rate: Option<f64>,
    pub max_age_seconds: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PatternFilters {
    fn default() -> Self {
        Self {
            pattern_type: None,
            task_type: None,
            min_confidence: None,
            min_success_rate: None,
            max_age_seconds: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PatternFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern_type(mut self, pattern_type: impl Into<String>) -> Self {
        self.pattern_type = Some(pattern_type.into());
        self
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn min_success_rate(mut self, min: f64) -> Self {
        self.min_success_rate = Some(min);
        self
    }

    pub fn max_age_seconds(mut self, seconds: i64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// True when the page is empty by construction.
    pub fn selects_nothing(&self) -> bool {
        self.limit <= 0
    }

    /// Oldest `created_at` still admitted by `max_age_seconds`.
    pub fn created_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_age_seconds.map(|secs| {
            Duration::try_seconds(secs.max(0))
                .and_then(|age| now.checked_sub_signed(age))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    /// Deterministic query-cache key covering every field.
    pub fn cache_key(&self) -> String {
        let canonical = format!(
            "pt={:?}|tt={:?}|mc={:?}|ms={:?}|age={:?}|limit={}|offset={}",
            self.pattern_type,
            self.task_type,
            self.min_confidence,
            self.min_success_rate,
            self.max_age_seconds,
            self.limit,
            self.offset,
        );
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        format!("query:{}", &digest[..16])
    }

    pub fn matches(&self, pattern: &ExecutionPattern, now: DateTime<Utc>) -> bool {
        if let Some(pattern_type) = &self.pattern_type {
            if &pattern.pattern_used != pattern_type {
                return false;
            }
        }
        if let Some(task_type) = &self.task_type {
            if &pattern.task_type != task_type {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if pattern.confidence_score < min {
                return false;
            }
        }
        if let Some(min) = self.min_success_rate {
            if pattern.success_rate < min {
                return false;
            }
        }
        if let Some(cutoff) = self.created_after(now) {
            if pattern.created_at < cutoff {
                return false;
            }
        }
        true
    }

    /// Filters, orders and pages `patterns` in memory.
    pub fn apply<I>(&self, patterns: I, now: DateTime<Utc>) -> Vec<ExecutionPattern>
    where
        I: IntoIterator<Item = ExecutionPattern>,
    {
        if self.selects_nothing() {
            return Vec::new();
        }
        let mut selected: Vec<ExecutionPattern> = patterns
            .into_iter()
            .filter(|p| self.matches(p, now))
            .collect();
        selected.sort_by(rank_order);
        selected
            .into_iter()
            .skip(self.offset.max(0) as usize)
            .take(self.limit as usize)
            .collect()
    }
}

/// Confidence desc, success rate desc, id asc.
pub fn rank_order(a: &ExecutionPattern, b: &ExecutionPattern) -> Ordering {
    b.confidence_score
        .partial_cmp(&a.confidence_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}
