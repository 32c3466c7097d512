// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Learning
//!
//! Two-tier learning store for the orchestrator's decision layer: a hot
//! in-memory [`LearningCoordinator`] with pluggable learning modules, backed
//! by an optional durable [`SqliteLearningStore`].
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Records execution patterns and serves recommendations
//!
//! ```no_run
//! use aegis_learning::{ExecutionPattern, LearningConfig, LearningContext, LearningSystem};
//!
//! # async fn run() -> Result<(), aegis_learning::ConfigError> {
//! let system = LearningSystem::start(LearningConfig::default()).await?;
//! system
//!     .coordinator
//!     .track_execution_pattern(ExecutionPattern::new("code_analysis", "parallel").with_success_rate(0.9));
//! let recommendations = system
//!     .coordinator
//!     .get_recommendations(&LearningContext::new("code analysis of the parser"))
//!     .await;
//! # let _ = recommendations;
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod application;
pub mod infrastructure;

pub use config::{CacheConfig, ConfigError, CoordinatorConfig, LearningConfig, MaintenanceConfig, StoreConfig};
pub use domain::*;
pub use application::*;
pub use infrastructure::{
    ApproxSize, BoundedLruCache, CacheStats, EventBusError, LatencySummary, LatencyWindow,
    LearningEventBus, LearningEventReceiver, SqliteLearningStore, StoreStats, SCHEMA_VERSION,
};
