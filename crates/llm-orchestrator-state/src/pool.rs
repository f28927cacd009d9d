// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection pooling via sqlx's `Any` driver.
//!
//! Every query in this crate is written with `?` placeholders and plain
//! SQL that both Postgres and SQLite understand, so one pool type serves
//! a production Postgres deployment and a SQLite file (or `:memory:`) used
//! in tests and the bundled recovery demo.

use crate::error::{Result, StateError};
use sqlx::any::{AnyPoolOptions, Any};
use sqlx::Pool;
use std::sync::Once;
use std::time::Duration;

pub type StatePool = Pool<Any>;

static INSTALL_DRIVERS: Once = Once::new();

/// Connects to `database_url`, which may be a `postgres://...` or
/// `sqlite://...` URL. Safe to call from multiple tasks; the underlying
/// driver registration only happens once per process.
pub async fn connect(database_url: &str) -> Result<StatePool> {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });

    AnyPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))
}

/// Runs the `CREATE TABLE IF NOT EXISTS` statements every store in this
/// crate depends on. Idempotent; safe to call on every process start.
pub async fn ensure_schema(pool: &StatePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_executions (
            execution_id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            status TEXT NOT NULL,
            context_json TEXT NOT NULL,
            result_json TEXT,
            error_message TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflow_executions_status ON workflow_executions(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_definitions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            capabilities_json TEXT NOT NULL,
            is_enabled INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_instances (
            id TEXT PRIMARY KEY,
            definition_id TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            status TEXT NOT NULL,
            config_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_agent_instances_workspace ON agent_instances(workspace_id, project_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS secrets (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            name TEXT NOT NULL,
            secret_type TEXT NOT NULL,
            encrypted_value TEXT NOT NULL,
            rotation_policy TEXT,
            is_active INTEGER NOT NULL,
            tags_json TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            last_rotated_at TEXT,
            rotation_due_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_secrets_workspace_name ON secrets(workspace_id, name)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspaces (
            id TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
