// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Flat row representations of the learning domain types.
//!
//! Conversions out of a row never fail on content: unparsable text columns
//! fall back to empty values.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::domain::codec::{
    decode_map, decode_timestamp, decode_tools, encode_map, encode_timestamp, encode_tools,
};
use crate::domain::{ExecutionPattern, PerformanceMetrics};

/// One `patterns` row; field names match the column names.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRow {
    pub id: String,
    pub task_type: String,
    pub pattern_used: String,
    pub execution_time: f64,
    pub success_rate: f64,
    pub confidence_score: f64,
    pub agent_count: i64,
    pub complexity_level: String,
    pub tools_used: String,
    pub context_factors: String,
    pub created_at: String,
    pub updated_at: String,
    pub usage_count: i64,
}

impl PatternRow {
    pub fn from_sqlite(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            task_type: row.try_get("task_type")?,
            pattern_used: row.try_get("pattern_used")?,
            execution_time: row.try_get("execution_time")?,
            success_rate: row.try_get("success_rate")?,
            confidence_score: row.try_get("confidence_score")?,
            agent_count: row.try_get("agent_count")?,
            complexity_level: row.try_get("complexity_level")?,
            tools_used: row.try_get("tools_used")?,
            context_factors: row.try_get("context_factors")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            usage_count: row.try_get("usage_count")?,
        })
    }
}

impl From<&ExecutionPattern> for PatternRow {
    fn from(pattern: &ExecutionPattern) -> Self {
        Self {
            id: pattern.id.clone(),
            task_type: pattern.task_type.clone(),
            pattern_used: pattern.pattern_used.clone(),
            execution_time: pattern.execution_time,
            success_rate: pattern.success_rate,
            confidence_score: pattern.confidence_score,
            agent_count: i64::from(pattern.agent_count),
            complexity_level: pattern.complexity_level.clone(),
            tools_used: encode_tools(&pattern.tools_used),
            context_factors: encode_map(&pattern.context_factors),
            created_at: encode_timestamp(&pattern.created_at),
            updated_at: encode_timestamp(&pattern.updated_at),
            usage_count: i64::try_from(pattern.usage_count).unwrap_or(i64::MAX),
        }
    }
}

impl From<PatternRow> for ExecutionPattern {
    fn from(row: PatternRow) -> Self {
        Self {
            id: row.id,
            task_type: row.task_type,
            pattern_used: row.pattern_used,
            execution_time: row.execution_time,
            success_rate: row.success_rate,
            confidence_score: row.confidence_score,
            agent_count: u32::try_from(row.agent_count).unwrap_or(0),
            complexity_level: row.complexity_level,
            tools_used: decode_tools(&row.tools_used),
            context_factors: decode_map(&row.context_factors),
            created_at: decode_timestamp(&row.created_at),
            updated_at: decode_timestamp(&row.updated_at),
            usage_count: u64::try_from(row.usage_count).unwrap_or(0),
        }
    }
}

/// One `metrics` row, minus the autoincrement id.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub component_name: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub baseline_value: f64,
    pub improvement_percentage: f64,
    pub sample_count: i64,
    pub confidence_interval: Option<String>,
    pub measured_at: String,
    pub metadata: String,
}

impl MetricRow {
    pub fn from_sqlite(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            component_name: row.try_get("component_name")?,
            metric_name: row.try_get("metric_name")?,
            metric_value: row.try_get("metric_value")?,
            baseline_value: row.try_get("baseline_value")?,
            improvement_percentage: row.try_get("improvement_percentage")?,
            sample_count: row.try_get("sample_count")?,
            confidence_interval: row.try_get("confidence_interval")?,
            measured_at: row.try_get("measured_at")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

impl From<&PerformanceMetrics> for MetricRow {
    fn from(metric: &PerformanceMetrics) -> Self {
        Self {
            component_name: metric.component_name.clone(),
            metric_name: metric.metric_name.clone(),
            metric_value: metric.metric_value,
            baseline_value: metric.baseline_value,
            improvement_percentage: metric.improvement_percentage,
            sample_count: i64::from(metric.sample_count),
            confidence_interval: metric
                .confidence_interval
                .and_then(|interval| serde_json::to_string(&interval).ok()),
            measured_at: encode_timestamp(&metric.measured_at),
            metadata: encode_map(&metric.metadata),
        }
    }
}

impl From<MetricRow> for PerformanceMetrics {
    fn from(row: MetricRow) -> Self {
        Self {
            component_name: row.component_name,
            metric_name: row.metric_name,
            metric_value: row.metric_value,
            baseline_value: row.baseline_value,
            improvement_percentage: row.improvement_percentage,
            sample_count: u32::try_from(row.sample_count).unwrap_or(0),
            confidence_interval: row
                .confidence_interval
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            measured_at: decode_timestamp(&row.measured_at),
            metadata: decode_map(&row.metadata),
        }
    }
}

/// Preference values are stored as JSON text; unparsable text reads as null.
pub fn encode_preference(value: &serde_json::Value) -> String {
    value.to_string()
}

pub fn decode_preference(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContextValue;

    #[test]
    fn test_pattern_round_trip_is_field_for_field() {
        let mut pattern = ExecutionPattern::new("code_analysis", "parallel_review")
            .with_id("p1")
            .with_confidence(0.9)
            .with_success_rate(0.85)
            .with_execution_time(12.25)
            .with_agent_count(3)
            .with_complexity("high")
            .with_tools(["grep", "read_file", "bash"])
            .with_context_factor("language", "rust")
            .with_context_factor("files", 42i64)
            .with_context_factor("coverage", 0.61)
            .with_context_factor("ci", true);
        pattern.usage_count = 7;

        let row = PatternRow::from(&pattern);
        assert_eq!(row.tools_used, "grep,read_file,bash");
        assert_eq!(ExecutionPattern::from(row), pattern);
    }

    #[test]
    fn test_malformed_columns_degrade_to_empty() {
        let mut row = PatternRow::from(&ExecutionPattern::new("t", "p").with_id("x"));
        row.context_factors = "{\"broken\": ".to_string();
        row.tools_used = String::new();
        row.agent_count = -1;

        let pattern = ExecutionPattern::from(row);
        assert!(pattern.context_factors.is_empty());
        assert!(pattern.tools_used.is_empty());
        assert_eq!(pattern.agent_count, 0);
    }

    #[test]
    fn test_metric_round_trip() {
        let mut metric = PerformanceMetrics::new("coordinator", "track_latency_ms", 0.4, 0.5)
            .with_samples(200)
            .with_confidence_interval(0.35, 0.45);
        metric.metadata.insert("host".into(), ContextValue::Text("node-1".into()));

        assert_eq!(PerformanceMetrics::from(MetricRow::from(&metric)), metric);
    }

    #[test]
    fn test_preference_codec() {
        let value = serde_json::json!({"theme": "dark", "depth": 3});
        assert_eq!(decode_preference(&encode_preference(&value)), value);
        assert_eq!(decode_preference("not json"), serde_json::Value::Null);
    }
}
