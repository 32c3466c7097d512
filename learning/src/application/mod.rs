// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer for the learning bounded context

pub mod bootstrap;
pub mod coordinator;
pub mod maintenance;
pub mod modules;

pub use bootstrap::LearningSystem;
pub use coordinator::{
    CoordinatorStatus, LearningCoordinator, OptimizationReport, CACHE_SOURCE, PERSISTENT_SOURCE,
};
pub use maintenance::{LearningMaintenance, MaintenanceReport};
pub use modules::{PatternFrequencyModule, PerformanceTrendModule};
