// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Durable Learning Store Interface
//!
//! Persistence contract consumed by the coordinator, implemented in
//! `crate::infrastructure::sqlite_store`.
//!
//! Every operation reports failure as `false`, `None` or an empty
//! collection. Storage errors are logged at the implementation boundary and
//! never reach the decision layer; the coordinator's hot cache stays
//! authoritative while the store is unavailable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::filters::PatternFilters;
use super::performance::PerformanceMetrics;
use super::pattern::ExecutionPattern;

#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Upsert keyed by id; assigns an id when absent.
    async fn store_pattern(&self, pattern: &ExecutionPattern) -> bool;

    async fn get_pattern(&self, id: &str) -> Option<ExecutionPattern>;

    async fn retrieve_patterns(&self, filters: &PatternFilters) -> Vec<ExecutionPattern>;

    /// Sets `confidence_score` and bumps `updated_at`. False when no row matched.
    async fn update_pattern_weight(&self, id: &str, new_confidence: f64) -> bool;

    /// Deletes patterns older than `max_age` with confidence below `min_confidence`.
    async fn prune_patterns(&self, max_age: Duration, min_confidence: f64) -> u64;

    async fn store_user_preference(&self, key: &str, value: serde_json::Value) -> bool;

    async fn get_user_preferences(&self) -> HashMap<String, serde_json::Value>;

    async fn store_performance_metric(&self, metric: &PerformanceMetrics) -> bool;

    /// Metrics for `component` from the trailing `days`, newest first.
    async fn get_performance_history(&self, component: &str, days: u32) -> Vec<PerformanceMetrics>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store is not initialized")]
    NotInitialized,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Migration to version {version} failed: {reason}")]
    Migration { version: i64, reason: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
