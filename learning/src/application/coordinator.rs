// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # LearningCoordinator: Hot-Path Learning Entry Point
//!
//! Single entry point for the decision layer. Owns an in-memory pattern
//! cache keyed by `(task_type, pattern_used, complexity_level)`, a registry
//! of [`LearningModule`]s and, optionally, a durable [`LearningStore`].
//!
//! ## Tracking
//!
//! [`track_execution_pattern`](LearningCoordinator::track_execution_pattern)
//! is synchronous: it updates the cache and returns. Module notification and
//! write-through run as one background task per pattern on a
//! [`TaskTracker`], so neither adds latency to the caller and
//! [`shutdown`](LearningCoordinator::shutdown) can await them.
//!
//! ## Recommendations
//!
//! Candidates come from three places: the last top recommendation cached
//! under the context signature (source `"cache"`), every enabled module
//! (source = module name) and, with a store attached, persisted patterns
//! (source `"persistent"`). Candidates are deduplicated by strategy, ranked
//! by confidence and truncated to `max_recommendations`.
//!
//! ## Failure Isolation
//!
//! A module returning an error or panicking is logged and reported as a
//! [`LearningEvent::ModuleFailed`]; the remaining modules and the caller are
//! unaffected. Store failures surface as `false`/empty results.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates the hot cache, learning modules and durability

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use futures::future::{join, join_all};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::domain::{
    ExecutionPattern, LearningContext, LearningEvent, LearningModule, LearningPhase, LearningStore,
    ModuleStatus, PatternFilters, PerformanceMetrics, Recommendation,
};
use crate::infrastructure::{
    BoundedLruCache, CacheStats, LatencySummary, LatencyWindow, LearningEventBus,
    LearningEventReceiver,
};

pub const CACHE_SOURCE: &str = "cache";
pub const PERSISTENT_SOURCE: &str = "persistent";

/// Snapshot returned by [`LearningCoordinator::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub initialized: bool,
    pub phase: LearningPhase,
    pub uptime_seconds: f64,
    pub patterns_learned: u64,
    pub persistence_enabled: bool,
    pub modules: Vec<ModuleStatus>,
    pub cache: CacheStats,
    pub recommendation_cache: CacheStats,
    /// Estimate recomputed by `optimize_performance`.
    pub memory_bytes: u64,
    pub track_latency: LatencySummary,
    pub recommendation_latency: LatencySummary,
    pub pending_tasks: usize,
}

/// Outcome of one [`LearningCoordinator::optimize_performance`] pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub evicted: usize,
    pub phase: LearningPhase,
    pub phase_advanced: bool,
    pub memory_bytes: u64,
}

pub struct LearningCoordinator {
    config: CoordinatorConfig,
    store: Option<Arc<dyn LearningStore>>,
    modules: RwLock<HashMap<String, Arc<dyn LearningModule>>>,
    cache: BoundedLruCache<String, ExecutionPattern>,
    recommendation_cache: BoundedLruCache<String, Recommendation>,
    phase: Mutex<LearningPhase>,
    initialized: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    patterns_learned: AtomicU64,
    memory_bytes: AtomicU64,
    runtime: Mutex<Option<Handle>>,
    tracker: TaskTracker,
    /// Serializes the close/wait/reopen sequences on `tracker`.
    drain: tokio::sync::Mutex<()>,
    events: LearningEventBus,
    track_latency: LatencyWindow,
    recommendation_latency: LatencyWindow,
}

impl LearningCoordinator {
    pub fn new(config: CoordinatorConfig, store: Option<Arc<dyn LearningStore>>) -> Self {
        Self {
            cache: BoundedLruCache::from_config(&config.cache),
            recommendation_cache: BoundedLruCache::from_config(&config.recommendation_cache),
            events: LearningEventBus::new(config.event_capacity),
            config,
            store,
            modules: RwLock::new(HashMap::new()),
            phase: Mutex::new(LearningPhase::Initialization),
            initialized: AtomicBool::new(false),
            started_at: Mutex::new(None),
            patterns_learned: AtomicU64::new(0),
            memory_bytes: AtomicU64::new(0),
            runtime: Mutex::new(None),
            tracker: TaskTracker::new(),
            drain: tokio::sync::Mutex::new(()),
            track_latency: LatencyWindow::default(),
            recommendation_latency: LatencyWindow::default(),
        }
    }

    /// Coordinator without durability.
    pub fn in_memory(config: CoordinatorConfig) -> Self {
        Self::new(config, None)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn persistence_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn phase(&self) -> LearningPhase {
        *self.phase.lock()
    }

    pub fn subscribe(&self) -> LearningEventReceiver {
        self.events.subscribe()
    }

    /// Handle for publishing into the coordinator's event stream.
    pub fn event_bus(&self) -> LearningEventBus {
        self.events.clone()
    }

    /// Resets the cache and metrics and enters `PATTERN_COLLECTION`.
    /// A no-op when already initialized.
    pub async fn initialize(&self) {
        if self.is_initialized() {
            debug!("Learning coordinator already initialized");
            return;
        }

        *self.runtime.lock() = Handle::try_current().ok();
        self.cache.invalidate(None);
        self.recommendation_cache.invalidate(None);
        self.patterns_learned.store(0, Ordering::Relaxed);
        self.memory_bytes.store(0, Ordering::Relaxed);
        self.track_latency.clear();
        self.recommendation_latency.clear();
        self.tracker.reopen();
        *self.started_at.lock() = Some(Instant::now());

        let from = std::mem::replace(&mut *self.phase.lock(), LearningPhase::PatternCollection);
        self.initialized.store(true, Ordering::Release);

        self.events.publish(LearningEvent::PhaseAdvanced {
            from,
            to: LearningPhase::PatternCollection,
            patterns_learned: 0,
            timestamp: Utc::now(),
        });
        info!(
            persistence = self.persistence_enabled(),
            modules = self.modules.read().len(),
            "Learning coordinator initialized"
        );
    }

    /// Registers `module` enabled. A module with the same name is replaced.
    pub fn register_module(&self, module: Arc<dyn LearningModule>) {
        module.set_enabled(true);
        let name = module.name().to_string();
        let replaced = self.modules.write().insert(name.clone(), module).is_some();
        if replaced {
            warn!(module = %name, "Replaced learning module with the same name");
        } else {
            info!(module = %name, "Registered learning module");
        }
    }

    pub fn unregister_module(&self, name: &str) -> bool {
        let removed = self.modules.write().remove(name).is_some();
        if removed {
            info!(module = name, "Unregistered learning module");
        }
        removed
    }

    /// False when no module is registered under `name`.
    pub fn set_module_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.modules.read().get(name) {
            Some(module) => {
                module.set_enabled(enabled);
                debug!(module = name, enabled, "Learning module toggled");
                true
            }
            None => false,
        }
    }

    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Records an observation in the hot cache and schedules module
    /// notification and write-through in the background.
    ///
    /// Returns once the cache holds the pattern. A re-observation of the
    /// same cache key keeps the cached id and continues its usage count.
    pub fn track_execution_pattern(&self, mut pattern: ExecutionPattern) -> bool {
        if !self.is_initialized() {
            warn!(task_type = %pattern.task_type, "Pattern dropped: learning coordinator not initialized");
            return false;
        }
        let started = Instant::now();

        let key = pattern.cache_key();
        if let Some(existing) = self.cache.peek(&key) {
            if pattern.id.is_empty() {
                pattern.id = existing.id;
            }
            pattern.usage_count = pattern.usage_count.max(existing.usage_count);
        }
        pattern.ensure_id();
        pattern.updated_at = Utc::now();
        pattern.usage_count = pattern.usage_count.saturating_add(1);

        self.cache.put(key, pattern.clone());
        self.patterns_learned.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_learning_patterns_tracked_total").increment(1);

        self.events.publish(LearningEvent::PatternTracked {
            pattern_id: pattern.id.clone(),
            task_type: pattern.task_type.clone(),
            pattern_used: pattern.pattern_used.clone(),
            usage_count: pattern.usage_count,
            timestamp: pattern.updated_at,
        });

        let task = self.learn_task(pattern);
        self.spawn_background(task);

        let elapsed = started.elapsed();
        self.track_latency.record(elapsed);
        if elapsed > self.config.sync_latency_target {
            warn!(
                elapsed_us = elapsed.as_micros() as u64,
                target_us = self.config.sync_latency_target.as_micros() as u64,
                "Slow track_execution_pattern"
            );
        }
        true
    }

    /// Up to `max_recommendations` suggestions, best first.
    pub async fn get_recommendations(&self, context: &LearningContext) -> Vec<Recommendation> {
        if !self.is_initialized() {
            return Vec::new();
        }
        let started = Instant::now();
        let signature = context.signature();
        let mut candidates = Vec::new();

        match self.recommendation_cache.get(&signature) {
            Some(mut cached) => {
                metrics::counter!("aegis_learning_recommendation_cache_hits_total").increment(1);
                cached.source = CACHE_SOURCE.to_string();
                candidates.push(cached);
            }
            None => {
                metrics::counter!("aegis_learning_recommendation_cache_misses_total").increment(1);
            }
        }

        let modules = self.enabled_modules();
        let results = join_all(
            modules
                .iter()
                .map(|module| guarded(module.recommendations(context))),
        )
        .await;
        for (module, result) in modules.iter().zip(results) {
            match result {
                Ok(recommendations) => {
                    candidates.extend(recommendations.into_iter().map(|mut rec| {
                        rec.source = module.name().to_string();
                        rec
                    }));
                }
                Err(e) => report_module_failure(&self.events, module.name(), "recommendations", &e),
            }
        }

        if let Some(store) = &self.store {
            let mut filters = PatternFilters::new()
                .min_confidence(self.config.min_recommendation_confidence)
                .limit(self.config.persisted_recommendation_limit);
            if let Some(current) = &context.current_pattern {
                filters = filters.pattern_type(current.clone());
            }
            candidates.extend(
                store
                    .retrieve_patterns(&filters)
                    .await
                    .iter()
                    .map(|pattern| Recommendation::from_pattern(pattern, PERSISTENT_SOURCE)),
            );
        }

        let ranked = rank_recommendations(candidates, self.config.max_recommendations);
        if let Some(top) = ranked.first() {
            self.recommendation_cache.put(signature, top.clone());
        }

        self.recommendation_latency.record(started.elapsed());
        ranked
    }

    /// Evicts stale cache entries, advances the learning phase by at most
    /// one step and refreshes the memory estimate.
    pub fn optimize_performance(&self) -> OptimizationReport {
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(self.config.stale_entry_age).ok();
        let evicted = self.cache.retain(|_, pattern| {
            max_age.map_or(true, |max_age| pattern.age(now) <= max_age)
        });

        let transition = self.advance_phase();
        if let Some((from, to)) = transition {
            let patterns_learned = self.patterns_learned.load(Ordering::Relaxed);
            info!(from = %from, to = %to, patterns_learned, "Learning phase advanced");
            self.events.publish(LearningEvent::PhaseAdvanced {
                from,
                to,
                patterns_learned,
                timestamp: now,
            });
        }

        let memory_bytes = (self.cache.memory_bytes() + self.recommendation_cache.memory_bytes()) as u64;
        self.memory_bytes.store(memory_bytes, Ordering::Relaxed);
        metrics::gauge!("aegis_learning_cache_memory_bytes").set(memory_bytes as f64);

        if evicted > 0 {
            debug!(evicted, "Evicted stale learning cache entries");
        }

        OptimizationReport {
            evicted,
            phase: self.phase(),
            phase_advanced: transition.is_some(),
            memory_bytes,
        }
    }

    fn advance_phase(&self) -> Option<(LearningPhase, LearningPhase)> {
        let learned = self.patterns_learned.load(Ordering::Relaxed);
        let mut phase = self.phase.lock();
        let threshold = match *phase {
            LearningPhase::PatternCollection => self.config.analysis_threshold,
            LearningPhase::Analysis => self.config.optimization_threshold,
            LearningPhase::Optimization => self.config.application_threshold,
            LearningPhase::Initialization | LearningPhase::Application => return None,
        };
        if learned < threshold {
            return None;
        }
        let next = phase.next()?;
        let from = std::mem::replace(&mut *phase, next);
        Some((from, next))
    }

    pub fn status(&self) -> CoordinatorStatus {
        let modules: Vec<Arc<dyn LearningModule>> = self.modules.read().values().cloned().collect();
        let mut module_status: Vec<ModuleStatus> = modules.iter().map(|m| m.status()).collect();
        module_status.sort_by(|a, b| a.name.cmp(&b.name));

        CoordinatorStatus {
            initialized: self.is_initialized(),
            phase: self.phase(),
            uptime_seconds: self
                .started_at
                .lock()
                .map(|at| at.elapsed().as_secs_f64())
                .unwrap_or_default(),
            patterns_learned: self.patterns_learned.load(Ordering::Relaxed),
            persistence_enabled: self.persistence_enabled(),
            modules: module_status,
            cache: self.cache.stats(),
            recommendation_cache: self.recommendation_cache.stats(),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            track_latency: self.track_latency.summary(),
            recommendation_latency: self.recommendation_latency.summary(),
            pending_tasks: self.tracker.len(),
        }
    }

    /// Waits for every background task spawned so far without shutting down.
    pub async fn wait_for_background_tasks(&self) {
        let _drain = self.drain.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        if self.is_initialized() {
            self.tracker.reopen();
        }
    }

    /// Awaits in-flight background work, then clears the cache and registry.
    pub async fn shutdown(&self) {
        let _drain = self.drain.lock().await;
        self.initialized.store(false, Ordering::Release);
        self.tracker.close();
        self.tracker.wait().await;

        self.modules.write().clear();
        self.cache.invalidate(None);
        self.recommendation_cache.invalidate(None);
        *self.phase.lock() = LearningPhase::Initialization;
        *self.started_at.lock() = None;
        *self.runtime.lock() = None;
        info!("Learning coordinator shut down");
    }

    /// Fans metrics out to enabled modules and persists them. False when
    /// any metric failed to persist; module failures are isolated.
    pub async fn update_performance_metrics(&self, metrics: &[PerformanceMetrics]) -> bool {
        let modules = self.enabled_modules();
        let results = join_all(
            modules
                .iter()
                .map(|module| guarded(module.update_performance_metrics(metrics))),
        )
        .await;
        for (module, result) in modules.iter().zip(results) {
            if let Err(e) = result {
                report_module_failure(&self.events, module.name(), "update_performance_metrics", &e);
            }
        }

        let Some(store) = &self.store else {
            return true;
        };
        let stored = join_all(metrics.iter().map(|metric| store.store_performance_metric(metric))).await;
        stored.into_iter().all(|ok| ok)
    }

    /// Durable query when a store is attached, otherwise the same
    /// predicate and ordering over the hot cache.
    pub async fn find_patterns(&self, filters: &PatternFilters) -> Vec<ExecutionPattern> {
        match &self.store {
            Some(store) => store.retrieve_patterns(filters).await,
            None => filters.apply(self.cache.values(), Utc::now()),
        }
    }

    /// Hot-cache entry for a `task_type:pattern_used:complexity_level` key.
    pub fn cached_pattern(&self, key: &str) -> Option<ExecutionPattern> {
        self.cache.peek(key)
    }

    pub async fn store_user_preference(&self, key: &str, value: serde_json::Value) -> bool {
        match &self.store {
            Some(store) => store.store_user_preference(key, value).await,
            None => false,
        }
    }

    pub async fn get_user_preferences(&self) -> HashMap<String, serde_json::Value> {
        match &self.store {
            Some(store) => store.get_user_preferences().await,
            None => HashMap::new(),
        }
    }

    pub async fn get_performance_history(&self, component: &str, days: u32) -> Vec<PerformanceMetrics> {
        match &self.store {
            Some(store) => store.get_performance_history(component, days).await,
            None => Vec::new(),
        }
    }

    fn enabled_modules(&self) -> Vec<Arc<dyn LearningModule>> {
        let mut modules: Vec<Arc<dyn LearningModule>> = self
            .modules
            .read()
            .values()
            .filter(|module| module.is_enabled())
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.name().cmp(b.name()));
        modules
    }

    fn learn_task(&self, pattern: ExecutionPattern) -> impl Future<Output = ()> + Send + 'static {
        let modules = self.enabled_modules();
        let store = self.store.clone();
        let events = self.events.clone();

        async move {
            let notify = async {
                let results = join_all(
                    modules
                        .iter()
                        .map(|module| guarded(module.learn_from_execution(&pattern))),
                )
                .await;
                for (module, result) in modules.iter().zip(results) {
                    if let Err(e) = result {
                        report_module_failure(&events, module.name(), "learn_from_execution", &e);
                    }
                }
            };

            let persist = async {
                let Some(store) = &store else {
                    return;
                };
                if !store.store_pattern(&pattern).await {
                    warn!(pattern_id = %pattern.id, "Write-through to learning store failed");
                    events.publish(LearningEvent::PersistenceFailed {
                        pattern_id: pattern.id.clone(),
                        timestamp: Utc::now(),
                    });
                }
            };

            join(notify, persist).await;
        }
    }

    fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.lock().clone().or_else(|| Handle::try_current().ok());
        match handle {
            Some(handle) => {
                self.tracker.spawn_on(task, &handle);
            }
            None => warn!("No async runtime available; background learning skipped"),
        }
    }
}

/// Turns a panicking module hook into an error.
async fn guarded<T>(hook: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("learning module panicked")),
    }
}

fn report_module_failure(
    events: &LearningEventBus,
    module: &str,
    operation: &'static str,
    error: &anyhow::Error,
) {
    warn!(module, operation, error = %error, "Learning module failed");
    metrics::counter!(
        "aegis_learning_module_failures_total",
        "module" => module.to_string(),
        "operation" => operation
    )
    .increment(1);
    events.publish(LearningEvent::ModuleFailed {
        module: module.to_string(),
        operation: operation.to_string(),
        error: error.to_string(),
        timestamp: Utc::now(),
    });
}

/// Deduplicates by strategy (highest confidence wins) and ranks by
/// confidence, then strategy name.
fn rank_recommendations(candidates: Vec<Recommendation>, limit: usize) -> Vec<Recommendation> {
    let mut best: HashMap<String, Recommendation> = HashMap::new();
    for candidate in candidates {
        match best.get(&candidate.pattern) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                best.insert(candidate.pattern.clone(), candidate);
            }
        }
    }

    let mut ranked: Vec<Recommendation> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
    ranked.truncate(limit);
    ranked
}
