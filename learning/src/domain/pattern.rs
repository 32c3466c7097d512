// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Patterns
//!
//! An [`ExecutionPattern`] records one task execution: the strategy the
//! decision layer picked, how long it took and how well it went. Patterns
//! are plain values and are cloned, never shared, across components.
//!
//! The `codec` helpers at the bottom define the flat text encoding used for
//! tabular storage. Decoding never fails: malformed input degrades to an
//! empty value.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scalar carried by context, preference and metadata maps.
///
/// Serialized untagged, so a map encodes as a plain JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ContextValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Integer(i) => Some(*i as f64),
            ContextValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::Integer(value)
    }
}

/// JSON has no NaN or infinity, so non-finite numbers are kept as text.
impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            ContextValue::Number(value)
        } else {
            ContextValue::Text(value.to_string())
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Text(value)
    }
}

/// Ordered string-keyed map of scalars.
pub type ContextMap = BTreeMap<String, ContextValue>;

/// One observed task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPattern {
    /// Empty until assigned by [`ExecutionPattern::ensure_id`].
    #[serde(default)]
    pub id: String,
    pub task_type: String,
    /// Strategy / approach chosen for the task.
    pub pattern_used: String,
    /// Wall-clock seconds.
    pub execution_time: f64,
    pub success_rate: f64,
    pub confidence_score: f64,
    pub agent_count: u32,
    pub complexity_level: String,
    /// Insertion-ordered, duplicate-free tool names.
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub context_factors: ContextMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub usage_count: u64,
}

impl ExecutionPattern {
    pub fn new(task_type: impl Into<String>, pattern_used: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            task_type: task_type.into(),
            pattern_used: pattern_used.into(),
            execution_time: 0.0,
            success_rate: 0.0,
            confidence_score: 0.5,
            agent_count: 1,
            complexity_level: "medium".to_string(),
            tools_used: Vec::new(),
            context_factors: ContextMap::new(),
            created_at: now,
            updated_at: now,
            usage_count: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = seconds.max(0.0);
        self
    }

    pub fn with_agent_count(mut self, agent_count: u32) -> Self {
        self.agent_count = agent_count;
        self
    }

    pub fn with_complexity(mut self, complexity_level: impl Into<String>) -> Self {
        self.complexity_level = complexity_level.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tool in tools {
            self.add_tool(tool);
        }
        self
    }

    pub fn with_context_factor(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.context_factors.insert(key.into(), value.into());
        self
    }

    /// Appends a tool unless it is empty or already recorded.
    pub fn add_tool(&mut self, tool: impl Into<String>) {
        let tool = tool.into();
        if !tool.is_empty() && !self.tools_used.contains(&tool) {
            self.tools_used.push(tool);
        }
    }

    /// Assigns a fresh UUID when no id is set and returns the id.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        &self.id
    }

    /// Hot-cache key: `(task_type, pattern_used, complexity_level)`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.task_type, self.pattern_used, self.complexity_level)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// Flat text encodings for list, map and timestamp fields.
pub mod codec {
    use super::*;

    pub const TOOL_DELIMITER: char = ',';
    const ESCAPE: char = '\\';

    /// Joins tool names with `,`. Literal `,` and `\` inside a name are
    /// backslash-escaped.
    pub fn encode_tools(tools: &[String]) -> String {
        let mut out = String::new();
        for (i, tool) in tools.iter().enumerate() {
            if i > 0 {
                out.push(TOOL_DELIMITER);
            }
            for c in tool.chars() {
                if c == TOOL_DELIMITER || c == ESCAPE {
                    out.push(ESCAPE);
                }
                out.push(c);
            }
        }
        out
    }

    pub fn decode_tools(raw: &str) -> Vec<String> {
        let mut tools = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                ESCAPE => current.push(chars.next().unwrap_or(ESCAPE)),
                TOOL_DELIMITER => tools.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        tools.push(current);
        tools.retain(|t| !t.is_empty());
        tools
    }

    pub fn encode_map(map: &ContextMap) -> String {
        serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
    }

    /// Entries that do not decode to a scalar (e.g. a non-finite number
    /// written as `null`) are dropped individually.
    pub fn decode_map(raw: &str) -> ContextMap {
        let Ok(object) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) else {
            return ContextMap::new();
        };
        object
            .into_iter()
            .filter_map(|(key, value)| serde_json::from_value(value).ok().map(|v| (key, v)))
            .collect()
    }

    /// Fixed-width RFC 3339 with nanoseconds, so text order is time order.
    pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn decode_timestamp(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }
}
