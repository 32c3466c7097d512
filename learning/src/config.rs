// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Learning Configuration
//!
//! Constructor-time parameters for the coordinator and the durable store.
//! Nothing here is mutable at runtime. Durations use humantime notation
//! (`"5ms"`, `"1h"`) when (de)serialized.
//!
//! ```yaml
//! coordinator:
//!   cache:
//!     max_entries: 10000
//!     max_memory_mb: 50
//!   stale_entry_age: 1h
//! store:
//!   database_path: /var/lib/aegis/learning.db
//!   pool_size: 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Entry-count and memory limits for one LRU tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_memory_mb: f64,
}

impl CacheConfig {
    pub fn new(max_entries: usize, max_memory_mb: f64) -> Self {
        Self { max_entries, max_memory_mb }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(1_000, 50.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Hot pattern cache keyed by `(task_type, pattern_used, complexity_level)`.
    pub cache: CacheConfig,

    /// Best recommendation per context signature.
    pub recommendation_cache: CacheConfig,

    /// Entries not updated for this long are dropped by `optimize_performance`.
    #[serde(with = "humantime_serde")]
    pub stale_entry_age: Duration,

    /// Learned-pattern counts that unlock ANALYSIS, OPTIMIZATION and APPLICATION.
    pub analysis_threshold: u64,
    pub optimization_threshold: u64,
    pub application_threshold: u64,

    /// Synchronous `track_execution_pattern` budget; slower calls are logged.
    #[serde(with = "humantime_serde")]
    pub sync_latency_target: Duration,

    pub max_recommendations: usize,

    /// Floor for recommendations merged from the durable store.
    pub min_recommendation_confidence: f64,
    pub persisted_recommendation_limit: i64,

    /// Broadcast buffer for learning events.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::new(10_000, 50.0),
            recommendation_cache: CacheConfig::new(1_000, 5.0),
            stale_entry_age: Duration::from_secs(3600),
            analysis_threshold: 100,
            optimization_threshold: 500,
            application_threshold: 1_000,
            sync_latency_target: Duration::from_millis(1),
            max_recommendations: 10,
            min_recommendation_confidence: 0.3,
            persisted_recommendation_limit: 5,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,

    /// Connections opened at initialization and held for the store's lifetime.
    pub pool_size: u32,

    pub pattern_cache: CacheConfig,
    pub query_cache: CacheConfig,

    /// Operations slower than this are logged at warn.
    #[serde(with = "humantime_serde")]
    pub latency_target: Duration,

    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("aegis-learning.db"),
            pool_size: 5,
            pattern_cache: CacheConfig::new(1_000, 50.0),
            query_cache: CacheConfig::new(500, 25.0),
            latency_target: Duration::from_millis(5),
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Periodic pruning of the durable store and stale hot-cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Durable patterns idle for longer than this are pruning candidates.
    #[serde(with = "humantime_serde")]
    pub max_pattern_age: Duration,

    /// Candidates at or above this confidence are kept.
    pub min_confidence: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600),
            max_pattern_age: Duration::from_secs(90 * 86_400),
            min_confidence: 0.2,
        }
    }
}

/// Top-level configuration. `store: None` runs the coordinator in-memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub coordinator: CoordinatorConfig,
    pub store: Option<StoreConfig>,
    pub maintenance: MaintenanceConfig,

    /// Registers the frequency and trend modules at startup.
    pub builtin_modules: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            store: None,
            maintenance: MaintenanceConfig::default(),
            builtin_modules: true,
        }
    }
}

impl LearningConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: LearningConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_cache("coordinator.cache", &self.coordinator.cache)?;
        validate_cache("coordinator.recommendation_cache", &self.coordinator.recommendation_cache)?;

        let c = &self.coordinator;
        if !(c.analysis_threshold <= c.optimization_threshold
            && c.optimization_threshold <= c.application_threshold)
        {
            return Err(ConfigError::Invalid(
                "phase thresholds must be non-decreasing".to_string(),
            ));
        }
        if c.max_recommendations == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.max_recommendations must be positive".to_string(),
            ));
        }

        if self.maintenance.enabled && self.maintenance.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "maintenance.interval must be positive when enabled".to_string(),
            ));
        }

        if let Some(store) = &self.store {
            if store.pool_size == 0 {
                return Err(ConfigError::Invalid("store.pool_size must be positive".to_string()));
            }
            validate_cache("store.pattern_cache", &store.pattern_cache)?;
            validate_cache("store.query_cache", &store.query_cache)?;
        }
        Ok(())
    }
}

fn validate_cache(name: &str, cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.max_entries == 0 {
        return Err(ConfigError::Invalid(format!("{name}.max_entries must be positive")));
    }
    if !(cache.max_memory_mb > 0.0) {
        return Err(ConfigError::Invalid(format!("{name}.max_memory_mb must be positive")));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse learning config: {0}")]
    Parse(String),

    #[error("Invalid learning config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LearningConfig::default();
        assert!(config.store.is_none());
        assert!(config.builtin_modules);
        assert_eq!(config.maintenance.interval, Duration::from_secs(3600));
        assert_eq!(config.coordinator.cache.max_entries, 10_000);
        assert_eq!(config.coordinator.max_recommendations, 10);
        assert!(config.validate().is_ok());

        let store = StoreConfig::default();
        assert_eq!(store.pool_size, 5);
        assert_eq!(store.latency_target, Duration::from_millis(5));
    }

    #[test]
    fn test_from_yaml_with_humantime_durations() {
        let yaml = r#"
coordinator:
  stale_entry_age: 30m
  analysis_threshold: 10
  optimization_threshold: 20
  application_threshold: 30
store:
  database_path: /tmp/learning.db
  pool_size: 3
  latency_target: 2ms
  query_cache:
    max_entries: 64
    max_memory_mb: 1.5
"#;
        let config = LearningConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.coordinator.stale_entry_age, Duration::from_secs(1800));
        assert_eq!(config.coordinator.analysis_threshold, 10);
        // Unspecified fields keep their defaults.
        assert_eq!(config.coordinator.cache.max_entries, 10_000);

        let store = config.store.unwrap();
        assert_eq!(store.database_path, PathBuf::from("/tmp/learning.db"));
        assert_eq!(store.pool_size, 3);
        assert_eq!(store.latency_target, Duration::from_millis(2));
        assert_eq!(store.query_cache, CacheConfig::new(64, 1.5));
        assert_eq!(store.pattern_cache, CacheConfig::new(1_000, 50.0));
    }

    #[test]
    fn test_rejects_zero_pool() {
        let yaml = "store:\n  pool_size: 0\n";
        assert!(matches!(
            LearningConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_decreasing_thresholds() {
        let mut config = LearningConfig::default();
        config.coordinator.analysis_threshold = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_maintenance_interval() {
        let yaml = "maintenance:\n  interval: 0s\n";
        assert!(LearningConfig::from_yaml_str(yaml).is_err());

        let disabled = "maintenance:\n  enabled: false\n  interval: 0s\n";
        assert!(LearningConfig::from_yaml_str(disabled).is_ok());
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(matches!(
            LearningConfig::from_yaml_str("coordinator: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }
}
