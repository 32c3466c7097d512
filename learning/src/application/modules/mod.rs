// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Built-in learning modules

pub mod frequency;
pub mod performance_trend;

pub use frequency::PatternFrequencyModule;
pub use performance_trend::PerformanceTrendModule;
