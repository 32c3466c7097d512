// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learning Maintenance - Background pruning and phase progression
//!
//! Each cycle prunes idle low-confidence patterns from the durable store,
//! then runs [`LearningCoordinator::optimize_performance`] to evict stale
//! hot-cache entries and advance the learning phase.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic upkeep of the learning caches and store

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::coordinator::LearningCoordinator;
use crate::config::MaintenanceConfig;
use crate::domain::{LearningEvent, LearningStore};
use crate::infrastructure::LearningEventBus;

/// Result of one maintenance cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceReport {
    pub pruned: u64,
    pub evicted: usize,
}

pub struct LearningMaintenance {
    coordinator: Arc<LearningCoordinator>,
    store: Option<Arc<dyn LearningStore>>,
    events: Option<LearningEventBus>,
    config: MaintenanceConfig,
    shutdown_token: CancellationToken,
}

impl LearningMaintenance {
    pub fn new(
        coordinator: Arc<LearningCoordinator>,
        store: Option<Arc<dyn LearningStore>>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            coordinator,
            store,
            events: None,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Publishes a `PatternsPruned` event after cycles that removed anything.
    pub fn with_events(mut self, events: LearningEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Cancelling the token stops the loop after the current cycle.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Learning maintenance is disabled");
            return;
        }

        info!(
            interval = ?self.config.interval,
            max_pattern_age = ?self.config.max_pattern_age,
            min_confidence = self.config.min_confidence,
            "Starting learning maintenance task"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so a fresh process is not pruned at startup.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let report = self.run_cycle().await;
                    debug!(pruned = report.pruned, evicted = report.evicted, "Learning maintenance cycle completed");
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping learning maintenance");
                    break;
                }
            }
        }

        info!("Learning maintenance task stopped");
    }

    /// Runs one cycle immediately.
    pub async fn run_cycle(&self) -> MaintenanceReport {
        let pruned = match &self.store {
            Some(store) => {
                store
                    .prune_patterns(self.config.max_pattern_age, self.config.min_confidence)
                    .await
            }
            None => 0,
        };
        let evicted = self.coordinator.optimize_performance().evicted;

        if pruned > 0 || evicted > 0 {
            if let Some(events) = &self.events {
                events.publish(LearningEvent::PatternsPruned {
                    durable: pruned,
                    cached: evicted,
                    min_confidence: self.config.min_confidence,
                    timestamp: Utc::now(),
                });
            }
        }

        MaintenanceReport { pruned, evicted }
    }
}
