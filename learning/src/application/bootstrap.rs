// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learning System Bootstrap - Application Layer
//!
//! Wires a [`LearningCoordinator`] from a [`LearningConfig`]: opens the
//! durable store when one is configured, registers the built-in modules and
//! starts the maintenance task.
//!
//! A store that fails to initialize is logged and dropped; the coordinator
//! then runs in memory only.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Creates concrete learning components from configuration

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::coordinator::LearningCoordinator;
use crate::application::maintenance::LearningMaintenance;
use crate::application::modules::{PatternFrequencyModule, PerformanceTrendModule};
use crate::config::{ConfigError, LearningConfig, StoreConfig};
use crate::domain::LearningStore;
use crate::infrastructure::SqliteLearningStore;

/// A running learning subsystem.
pub struct LearningSystem {
    pub coordinator: Arc<LearningCoordinator>,
    pub store: Option<Arc<SqliteLearningStore>>,
    maintenance: Option<(CancellationToken, JoinHandle<()>)>,
}

impl LearningSystem {
    pub async fn start(config: LearningConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = match &config.store {
            Some(store_config) => open_store(store_config.clone()).await,
            None => None,
        };
        let durable: Option<Arc<dyn LearningStore>> =
            store.clone().map(|store| store as Arc<dyn LearningStore>);

        let coordinator = Arc::new(LearningCoordinator::new(config.coordinator.clone(), durable.clone()));
        if config.builtin_modules {
            coordinator.register_module(Arc::new(PatternFrequencyModule::new()));
            coordinator.register_module(Arc::new(PerformanceTrendModule::new()));
        }
        coordinator.initialize().await;

        let maintenance = config.maintenance.enabled.then(|| {
            let task = Arc::new(
                LearningMaintenance::new(coordinator.clone(), durable, config.maintenance.clone())
                    .with_events(coordinator.event_bus()),
            );
            (task.shutdown_token(), task.start())
        });

        info!(
            persistence = store.is_some(),
            modules = ?coordinator.module_names(),
            maintenance = maintenance.is_some(),
            "Learning system started"
        );

        Ok(Self {
            coordinator,
            store,
            maintenance,
        })
    }

    /// Stops maintenance, drains the coordinator, then closes the store.
    pub async fn shutdown(self) {
        if let Some((token, handle)) = self.maintenance {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Learning maintenance task ended abnormally");
            }
        }
        self.coordinator.shutdown().await;
        if let Some(store) = &self.store {
            store.shutdown().await;
        }
        info!("Learning system stopped");
    }
}

async fn open_store(config: StoreConfig) -> Option<Arc<SqliteLearningStore>> {
    let store = Arc::new(SqliteLearningStore::new(config));
    match store.initialize().await {
        Ok(()) => Some(store),
        Err(e) => {
            warn!(
                path = %store.database_path().display(),
                error = %e,
                "Learning store unavailable; continuing in memory"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaintenanceConfig;

    #[tokio::test]
    async fn test_in_memory_system_registers_builtin_modules() {
        let system = LearningSystem::start(LearningConfig::default()).await.unwrap();
        assert!(system.store.is_none());
        assert!(system.coordinator.is_initialized());
        assert_eq!(
            system.coordinator.module_names(),
            vec!["pattern_frequency".to_string(), "performance_trend".to_string()]
        );
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_unusable_store_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let config = LearningConfig {
            store: Some(StoreConfig::new(blocker.join("learning.db"))),
            maintenance: MaintenanceConfig {
                enabled: false,
                ..MaintenanceConfig::default()
            },
            ..LearningConfig::default()
        };
        let system = LearningSystem::start(config).await.unwrap();
        assert!(system.store.is_none());
        assert!(!system.coordinator.persistence_enabled());
        system.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = LearningConfig::default();
        config.coordinator.max_recommendations = 0;
        assert!(LearningSystem::start(config).await.is_err());
    }
}
