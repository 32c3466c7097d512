// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the learning bounded context

pub mod event_bus;
pub mod latency;
pub mod lru_cache;
pub mod rows;
pub(crate) mod schema;
pub mod sqlite_store;

pub use event_bus::{EventBusError, LearningEventBus, LearningEventReceiver};
pub use latency::{LatencySummary, LatencyWindow};
pub use lru_cache::{ApproxSize, BoundedLruCache, CacheStats};
pub use schema::SCHEMA_VERSION;
pub use sqlite_store::{SqliteLearningStore, StoreStats};
