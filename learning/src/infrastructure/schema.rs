// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Learning Store Schema
//!
//! Versioned migrations for the SQLite learning store. The
//! `schema_version` ledger holds one row per applied version. Migrations
//! above the stored maximum run in order, each inside its own transaction,
//! so re-running against an up-to-date database is a no-op.
//!
//! | Relation | Key | Notes |
//! |----------|-----|-------|
//! | `patterns` | `id` | one row per `ExecutionPattern`, upserted |
//! | `preferences` | `key` | JSON-encoded values |
//! | `metrics` | autoincrement `id` | append-only |
//! | `schema_version` | `version` | applied migrations |

use chrono::Utc;
use sqlx::{Connection, SqliteConnection};
use tracing::info;

use crate::domain::codec::encode_timestamp;
use crate::domain::StoreError;

/// Version this build migrates to.
pub const SCHEMA_VERSION: i64 = 2;

pub(crate) struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "patterns, preferences and metrics relations",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                pattern_used TEXT NOT NULL,
                execution_time REAL NOT NULL DEFAULT 0,
                success_rate REAL NOT NULL DEFAULT 0,
                confidence_score REAL NOT NULL DEFAULT 0,
                agent_count INTEGER NOT NULL DEFAULT 1,
                complexity_level TEXT NOT NULL DEFAULT 'medium',
                tools_used TEXT NOT NULL DEFAULT '',
                context_factors TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                component_name TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                metric_value REAL NOT NULL,
                baseline_value REAL NOT NULL,
                improvement_percentage REAL NOT NULL,
                sample_count INTEGER NOT NULL DEFAULT 1,
                confidence_interval TEXT,
                measured_at TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        ],
    },
    Migration {
        version: 2,
        description: "query indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_patterns_task_type ON patterns(task_type)",
            "CREATE INDEX IF NOT EXISTS idx_patterns_pattern_used ON patterns(pattern_used)",
            "CREATE INDEX IF NOT EXISTS idx_patterns_confidence ON patterns(confidence_score)",
            "CREATE INDEX IF NOT EXISTS idx_patterns_success_rate ON patterns(success_rate)",
            "CREATE INDEX IF NOT EXISTS idx_patterns_created_at ON patterns(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_patterns_updated_at ON patterns(updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_metrics_component ON metrics(component_name, measured_at)",
        ],
    },
];

const CREATE_SCHEMA_VERSION: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL
    )
"#;

pub(crate) async fn current_version(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(&mut *conn)
        .await?;
    Ok(version)
}

/// Creates the ledger if needed and applies pending migrations.
/// Returns the schema version after migrating.
pub(crate) async fn migrate(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    sqlx::query(CREATE_SCHEMA_VERSION).execute(&mut *conn).await?;
    let applied = current_version(conn).await?;
    let mut version = applied;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let failed = |e: sqlx::Error| StoreError::Migration {
            version: migration.version,
            reason: e.to_string(),
        };

        let mut tx = conn.begin().await.map_err(failed)?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await.map_err(failed)?;
        }
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(encode_timestamp(&Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied learning store migration"
        );
        version = migration.version;
    }

    Ok(version)
}
