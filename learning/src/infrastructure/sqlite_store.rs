// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Learning Store
//!
//! Durable [`LearningStore`] backed by a fixed-size `sqlx` SQLite pool.
//!
//! Two LRU tiers sit in front of the database: patterns by id and query
//! results by [`PatternFilters::cache_key`]. Every write that can change a
//! filtered view bumps the cache epoch and drops the query tier. A read
//! only populates a tier when the epoch it captured before hitting the
//! database is still current, so a read racing a write never parks stale
//! rows in the cache.
//!
//! Writes to the `patterns` relation are serialized by `write_lock`, which
//! makes the durable row and the cache agree on the last writer. An upsert
//! carrying a lower `usage_count` than the stored row is skipped.
//!
//! Query pages bounded by `max_age_seconds` are rechecked against the clock
//! on every hit.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::domain::codec::encode_timestamp;
use crate::domain::{ExecutionPattern, LearningStore, PatternFilters, PerformanceMetrics, StoreError};
use crate::infrastructure::latency::{LatencySummary, LatencyWindow};
use crate::infrastructure::lru_cache::{BoundedLruCache, CacheStats};
use crate::infrastructure::rows::{decode_preference, encode_preference, MetricRow, PatternRow};
use crate::infrastructure::schema;

const PATTERN_COLUMNS: &str = "id, task_type, pattern_used, execution_time, success_rate, \
     confidence_score, agent_count, complexity_level, tools_used, context_factors, \
     created_at, updated_at, usage_count";

/// Upsert by id. A row never moves back to a lower `usage_count`, so
/// write-throughs landing out of order keep the newest observation.
const UPSERT_PATTERN: &str = "\
    INSERT INTO patterns (id, task_type, pattern_used, execution_time, success_rate, \
     confidence_score, agent_count, complexity_level, tools_used, context_factors, \
     created_at, updated_at, usage_count) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(id) DO UPDATE SET \
     task_type = excluded.task_type, \
     pattern_used = excluded.pattern_used, \
     execution_time = excluded.execution_time, \
     success_rate = excluded.success_rate, \
     confidence_score = excluded.confidence_score, \
     agent_count = excluded.agent_count, \
     complexity_level = excluded.complexity_level, \
     tools_used = excluded.tools_used, \
     context_factors = excluded.context_factors, \
     created_at = excluded.created_at, \
     updated_at = excluded.updated_at, \
     usage_count = excluded.usage_count \
    WHERE excluded.usage_count >= patterns.usage_count";

const METRIC_COLUMNS: &str = "component_name, metric_name, metric_value, baseline_value, \
     improvement_percentage, sample_count, confidence_interval, measured_at, metadata";

/// Snapshot returned by [`SqliteLearningStore::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub initialized: bool,
    pub pattern_count: i64,
    pub preference_count: i64,
    pub metric_count: i64,
    pub storage_bytes: u64,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub latency: LatencySummary,
    pub uptime_seconds: f64,
    pub pool_size: u32,
    pub idle_connections: usize,
    pub schema_version: i64,
    pub pattern_cache: CacheStats,
    pub query_cache: CacheStats,
}

pub struct SqliteLearningStore {
    config: StoreConfig,
    pool: RwLock<Option<SqlitePool>>,
    init_lock: tokio::sync::Mutex<()>,
    write_lock: tokio::sync::Mutex<()>,
    cache_epoch: Mutex<u64>,
    pattern_cache: BoundedLruCache<String, ExecutionPattern>,
    query_cache: BoundedLruCache<String, Vec<ExecutionPattern>>,
    operations: AtomicU64,
    failures: AtomicU64,
    latencies: LatencyWindow,
    started_at: Instant,
    schema_version: AtomicI64,
}

impl SqliteLearningStore {
    /// Nothing touches disk until [`initialize`](Self::initialize).
    pub fn new(config: StoreConfig) -> Self {
        Self {
            pattern_cache: BoundedLruCache::from_config(&config.pattern_cache),
            query_cache: BoundedLruCache::from_config(&config.query_cache),
            config,
            pool: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            write_lock: tokio::sync::Mutex::new(()),
            cache_epoch: Mutex::new(0),
            operations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latencies: LatencyWindow::default(),
            started_at: Instant::now(),
            schema_version: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database_path
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.read().is_some()
    }

    /// Opens the pool, migrates the schema and pre-warms every connection.
    ///
    /// Safe to call repeatedly; later calls return immediately. A failure
    /// here means durability is unavailable and the caller decides whether
    /// to continue in memory.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            debug!(path = %self.config.database_path.display(), "Learning store already initialized");
            return Ok(());
        }

        let path = &self.config.database_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.config.busy_timeout);

        let size = self.config.pool_size.max(1);
        let pool = SqlitePoolOptions::new()
            .max_connections(size)
            .min_connections(size)
            .acquire_timeout(self.config.acquire_timeout)
            .connect_with(options)
            .await?;

        let version = match self.prepare(&pool, size).await {
            Ok(version) => version,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        self.schema_version.store(version, Ordering::Relaxed);
        *self.pool.write() = Some(pool);

        info!(
            path = %path.display(),
            pool_size = size,
            schema_version = version,
            "Learning store initialized"
        );
        Ok(())
    }

    async fn prepare(&self, pool: &SqlitePool, size: u32) -> Result<i64, StoreError> {
        let version = {
            let mut conn = pool.acquire().await?;
            schema::migrate(&mut conn).await?
        };

        // Hold every connection at once so the pool is fully open before the first caller.
        let warm = try_join_all((0..size).map(|_| pool.acquire())).await?;
        debug!(connections = warm.len(), "Learning store pool pre-warmed");
        drop(warm);

        Ok(version)
    }

    /// Closes every pooled connection and clears both caches.
    pub async fn shutdown(&self) {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        self.commit_write(|| {
            self.pattern_cache.invalidate(None);
        });
        info!(path = %self.config.database_path.display(), "Learning store shut down");
    }

    pub async fn stats(&self) -> StoreStats {
        let counts = match self.pool() {
            Ok(_) => self
                .observe("stats", async {
                    let pool = self.pool()?;
                    let mut conn = pool.acquire().await?;
                    let mut counts = [0i64; 3];
                    for (slot, table) in counts.iter_mut().zip(["patterns", "preferences", "metrics"]) {
                        *slot = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                            .fetch_one(&mut *conn)
                            .await?;
                    }
                    Ok(counts)
                })
                .await
                .unwrap_or_default(),
            Err(_) => [0; 3],
        };

        let (pool_size, idle_connections) = self
            .pool
            .read()
            .as_ref()
            .map(|pool| (pool.size(), pool.num_idle()))
            .unwrap_or((0, 0));

        StoreStats {
            initialized: self.is_initialized(),
            pattern_count: counts[0],
            preference_count: counts[1],
            metric_count: counts[2],
            storage_bytes: self.storage_bytes().await,
            total_operations: self.operations.load(Ordering::Relaxed),
            failed_operations: self.failures.load(Ordering::Relaxed),
            latency: self.latencies.summary(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            pool_size,
            idle_connections,
            schema_version: self.schema_version.load(Ordering::Relaxed),
            pattern_cache: self.pattern_cache.stats(),
            query_cache: self.query_cache.stats(),
        }
    }

    fn pool(&self) -> Result<SqlitePool, StoreError> {
        self.pool.read().clone().ok_or(StoreError::NotInitialized)
    }

    async fn storage_bytes(&self) -> u64 {
        let main = self.config.database_path.clone();
        let mut wal = main.clone().into_os_string();
        wal.push("-wal");

        let mut total = 0;
        for path in [main, PathBuf::from(wal)] {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                total += meta.len();
            }
        }
        total
    }

    /// Runs one store operation: times it, logs slow calls and failures,
    /// and turns errors into `None`.
    async fn observe<T, F>(&self, operation: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let elapsed = started.elapsed();

        self.operations.fetch_add(1, Ordering::Relaxed);
        self.latencies.record(elapsed);
        metrics::histogram!("aegis_learning_store_operation_seconds", "operation" => operation)
            .record(elapsed.as_secs_f64());

        if elapsed > self.config.latency_target {
            warn!(
                operation,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                target_ms = self.config.latency_target.as_secs_f64() * 1000.0,
                "Slow learning store operation"
            );
        }

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(operation, error = %e, "Learning store operation failed");
                None
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        *self.cache_epoch.lock()
    }

    /// Runs `fill` only if no write committed since `epoch` was read.
    fn cache_if_current(&self, epoch: u64, fill: impl FnOnce()) {
        let current = self.cache_epoch.lock();
        if *current == epoch {
            fill();
        }
    }

    /// Publishes a completed write: bumps the epoch, drops every cached
    /// query result and applies the per-record cache change.
    fn commit_write(&self, update: impl FnOnce()) {
        let mut epoch = self.cache_epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.query_cache.invalidate(None);
        update();
    }
}

fn select_patterns(filters: &PatternFilters, now: DateTime<Utc>) -> QueryBuilder<'static, Sqlite> {
    let mut query = QueryBuilder::new(format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE 1 = 1"));

    if let Some(pattern_type) = &filters.pattern_type {
        query.push(" AND pattern_used = ").push_bind(pattern_type.clone());
    }
    if let Some(task_type) = &filters.task_type {
        query.push(" AND task_type = ").push_bind(task_type.clone());
    }
    if let Some(min) = filters.min_confidence {
        query.push(" AND confidence_score >= ").push_bind(min);
    }
    if let Some(min) = filters.min_success_rate {
        query.push(" AND success_rate >= ").push_bind(min);
    }
    if let Some(cutoff) = filters.created_after(now) {
        query.push(" AND created_at >= ").push_bind(encode_timestamp(&cutoff));
    }

    query
        .push(" ORDER BY confidence_score DESC, success_rate DESC, id ASC LIMIT ")
        .push_bind(filters.limit)
        .push(" OFFSET ")
        .push_bind(filters.offset.max(0));
    query
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl LearningStore for SqliteLearningStore {
    async fn store_pattern(&self, pattern: &ExecutionPattern) -> bool {
        let mut pattern = pattern.clone();
        pattern.ensure_id();
        let row = PatternRow::from(&pattern);

        self.observe("store_pattern", async {
            let pool = self.pool()?;
            let _write = self.write_lock.lock().await;
            let mut conn = pool.acquire().await?;

            let written = sqlx::query(UPSERT_PATTERN)
                .bind(&row.id)
                .bind(&row.task_type)
                .bind(&row.pattern_used)
                .bind(row.execution_time)
                .bind(row.success_rate)
                .bind(row.confidence_score)
                .bind(row.agent_count)
                .bind(&row.complexity_level)
                .bind(&row.tools_used)
                .bind(&row.context_factors)
                .bind(&row.created_at)
                .bind(&row.updated_at)
                .bind(row.usage_count)
                .execute(&mut *conn)
                .await?
                .rows_affected();

            if written == 0 {
                debug!(
                    pattern_id = %row.id,
                    usage_count = row.usage_count,
                    "Skipped pattern write older than the stored row"
                );
                return Ok(());
            }
            self.commit_write(|| self.pattern_cache.put(row.id.clone(), pattern.clone()));
            Ok(())
        })
        .await
        .is_some()
    }

    async fn get_pattern(&self, id: &str) -> Option<ExecutionPattern> {
        if let Some(hit) = self.pattern_cache.get(id) {
            return Some(hit);
        }
        let epoch = self.current_epoch();

        let found = self
            .observe("get_pattern", async {
                let pool = self.pool()?;
                let mut conn = pool.acquire().await?;
                let row = sqlx::query(&format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
                Ok(row
                    .as_ref()
                    .map(PatternRow::from_sqlite)
                    .transpose()?
                    .map(ExecutionPattern::from))
            })
            .await
            .flatten()?;

        self.cache_if_current(epoch, || self.pattern_cache.put(found.id.clone(), found.clone()));
        Some(found)
    }

    async fn retrieve_patterns(&self, filters: &PatternFilters) -> Vec<ExecutionPattern> {
        if filters.selects_nothing() {
            return Vec::new();
        }

        let key = filters.cache_key();
        if let Some(hit) = self.query_cache.get(&key) {
            // An age bound moves with the clock: a page is only reusable
            // while every row is still inside it.
            let now = Utc::now();
            if filters.max_age_seconds.is_none() || hit.iter().all(|p| filters.matches(p, now)) {
                return hit;
            }
            self.query_cache.remove(&key);
        }
        let epoch = self.current_epoch();

        let Some(patterns) = self
            .observe("retrieve_patterns", async {
                let pool = self.pool()?;
                let mut conn = pool.acquire().await?;
                let mut query = select_patterns(filters, Utc::now());
                let rows = query.build().fetch_all(&mut *conn).await?;
                rows.iter()
                    .map(|row| PatternRow::from_sqlite(row).map(ExecutionPattern::from))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(StoreError::from)
            })
            .await
        else {
            return Vec::new();
        };

        self.cache_if_current(epoch, || self.query_cache.put(key, patterns.clone()));
        patterns
    }

    async fn update_pattern_weight(&self, id: &str, new_confidence: f64) -> bool {
        if !new_confidence.is_finite() {
            warn!(pattern_id = id, "Rejected non-finite pattern confidence");
            return false;
        }
        let confidence = new_confidence.clamp(0.0, 1.0);

        self.observe("update_pattern_weight", async {
            let pool = self.pool()?;
            let _write = self.write_lock.lock().await;
            let mut conn = pool.acquire().await?;

            let result = sqlx::query(
                "UPDATE patterns SET confidence_score = ?, updated_at = ? WHERE id = ?",
            )
            .bind(confidence)
            .bind(encode_timestamp(&Utc::now()))
            .bind(id)
            .execute(&mut *conn)
            .await?;

            self.commit_write(|| {
                self.pattern_cache.remove(id);
            });
            Ok(result.rows_affected() > 0)
        })
        .await
        .unwrap_or(false)
    }

    async fn prune_patterns(&self, max_age: Duration, min_confidence: f64) -> u64 {
        let before = encode_timestamp(&cutoff(Utc::now(), max_age));

        let pruned = self
            .observe("prune_patterns", async {
                let pool = self.pool()?;
                let _write = self.write_lock.lock().await;
                let mut conn = pool.acquire().await?;

                let result =
                    sqlx::query("DELETE FROM patterns WHERE updated_at < ? AND confidence_score < ?")
                        .bind(&before)
                        .bind(min_confidence)
                        .execute(&mut *conn)
                        .await?;

                self.commit_write(|| {
                    self.pattern_cache.invalidate(None);
                });
                Ok(result.rows_affected())
            })
            .await
            .unwrap_or(0);

        if pruned > 0 {
            info!(pruned, min_confidence, "Pruned stale learning patterns");
        }
        pruned
    }

    async fn store_user_preference(&self, key: &str, value: serde_json::Value) -> bool {
        self.observe("store_user_preference", async {
            let pool = self.pool()?;
            let mut conn = pool.acquire().await?;
            sqlx::query(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(encode_preference(&value))
            .bind(encode_timestamp(&Utc::now()))
            .execute(&mut *conn)
            .await?;
            Ok(())
        })
        .await
        .is_some()
    }

    async fn get_user_preferences(&self) -> HashMap<String, serde_json::Value> {
        self.observe("get_user_preferences", async {
            let pool = self.pool()?;
            let mut conn = pool.acquire().await?;
            let rows = sqlx::query("SELECT key, value FROM preferences")
                .fetch_all(&mut *conn)
                .await?;

            let mut preferences = HashMap::with_capacity(rows.len());
            for row in &rows {
                let key: String = row.try_get("key")?;
                let raw: String = row.try_get("value")?;
                preferences.insert(key, decode_preference(&raw));
            }
            Ok(preferences)
        })
        .await
        .unwrap_or_default()
    }

    async fn store_performance_metric(&self, metric: &PerformanceMetrics) -> bool {
        let row = MetricRow::from(metric);

        self.observe("store_performance_metric", async {
            let pool = self.pool()?;
            let mut conn = pool.acquire().await?;
            sqlx::query(&format!(
                "INSERT INTO metrics ({METRIC_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&row.component_name)
            .bind(&row.metric_name)
            .bind(row.metric_value)
            .bind(row.baseline_value)
            .bind(row.improvement_percentage)
            .bind(row.sample_count)
            .bind(&row.confidence_interval)
            .bind(&row.measured_at)
            .bind(&row.metadata)
            .execute(&mut *conn)
            .await?;
            Ok(())
        })
        .await
        .is_some()
    }

    async fn get_performance_history(&self, component: &str, days: u32) -> Vec<PerformanceMetrics> {
        let since = encode_timestamp(&cutoff(
            Utc::now(),
            Duration::from_secs(u64::from(days) * 86_400),
        ));

        self.observe("get_performance_history", async {
            let pool = self.pool()?;
            let mut conn = pool.acquire().await?;
            let rows = sqlx::query(&format!(
                "SELECT {METRIC_COLUMNS} FROM metrics \
                 WHERE component_name = ? AND measured_at >= ? \
                 ORDER BY measured_at DESC, id DESC"
            ))
            .bind(component)
            .bind(&since)
            .fetch_all(&mut *conn)
            .await?;

            rows.iter()
                .map(|row| MetricRow::from_sqlite(row).map(PerformanceMetrics::from))
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)
        })
        .await
        .unwrap_or_default()
    }
}
