// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database-backed `SecretStore` and `WorkspaceDirectory`.
//!
//! `llm-orchestrator-secrets::manager::{SecretStore, WorkspaceDirectory}` are
//! synchronous traits -- `SecretEngine` calls them inline while building a
//! response and can't await a query there. Same split as
//! [`crate::agent_directory::SqlAgentDirectory`]: an in-memory cache serves
//! the sync methods, kept current by an explicit async `refresh()` plus
//! write-through on every mutation.

use crate::error::Result;
use crate::pool::StatePool;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use llm_orchestrator_secrets::manager::{SecretStore, WorkspaceDirectory};
use llm_orchestrator_secrets::secret::{RotationPolicy, Secret};
use sqlx::Row;

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::error::StateError::Query(e.to_string()))
}

fn row_to_secret(row: &sqlx::any::AnyRow) -> Result<Secret> {
    let rotation_policy_json: String = row.try_get("rotation_policy")?;
    let tags_json: String = row.try_get("tags_json")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let last_rotated_at: String = row.try_get("last_rotated_at")?;
    let rotation_due_at: Option<String> = row.try_get("rotation_due_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let is_active: i64 = row.try_get("is_active")?;

    Ok(Secret {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        name: row.try_get("name")?,
        secret_type: row.try_get("secret_type")?,
        encrypted_value: row.try_get("encrypted_value")?,
        rotation_policy: serde_json::from_str::<RotationPolicy>(&rotation_policy_json)?,
        last_rotated_at: parse_timestamp(&last_rotated_at)?,
        rotation_due_at: rotation_due_at.map(|s| parse_timestamp(&s)).transpose()?,
        tags: serde_json::from_str(&tags_json)?,
        metadata: serde_json::from_str(&metadata_json)?,
        is_active: is_active != 0,
        created_at: parse_timestamp(&created_at)?,
        created_by: row.try_get("created_by")?,
        updated_at: parse_timestamp(&updated_at)?,
        updated_by: row.try_get("updated_by")?,
    })
}

pub struct SqlSecretStore {
    pool: StatePool,
    by_id: DashMap<String, Secret>,
}

impl SqlSecretStore {
    pub fn new(pool: StatePool) -> Self {
        Self { pool, by_id: DashMap::new() }
    }

    /// Reloads the cache from the database. `SecretEngine` only ever sees
    /// what's cached, so call this on startup and after any out-of-process
    /// write to the `secrets` table.
    pub async fn refresh(&self) -> Result<()> {
        let rows = sqlx::query("SELECT * FROM secrets").fetch_all(&self.pool).await?;
        self.by_id.clear();
        for row in &rows {
            let secret = row_to_secret(row)?;
            self.by_id.insert(secret.id.clone(), secret);
        }
        Ok(())
    }

    async fn persist(&self, secret: &Secret) -> Result<()> {
        let rotation_policy_json = serde_json::to_string(&secret.rotation_policy)?;
        let tags_json = serde_json::to_string(&secret.tags)?;
        let metadata_json = serde_json::to_string(&secret.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO secrets (
                id, workspace_id, name, secret_type, encrypted_value, rotation_policy,
                is_active, tags_json, metadata_json, created_at, created_by,
                updated_at, updated_by, last_rotated_at, rotation_due_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name, secret_type = excluded.secret_type,
                encrypted_value = excluded.encrypted_value, rotation_policy = excluded.rotation_policy,
                is_active = excluded.is_active, tags_json = excluded.tags_json,
                metadata_json = excluded.metadata_json, updated_at = excluded.updated_at,
                updated_by = excluded.updated_by, last_rotated_at = excluded.last_rotated_at,
                rotation_due_at = excluded.rotation_due_at
            "#,
        )
        .bind(&secret.id)
        .bind(&secret.workspace_id)
        .bind(&secret.name)
        .bind(&secret.secret_type)
        .bind(&secret.encrypted_value)
        .bind(rotation_policy_json)
        .bind(secret.is_active as i64)
        .bind(tags_json)
        .bind(metadata_json)
        .bind(secret.created_at.to_rfc3339())
        .bind(&secret.created_by)
        .bind(secret.updated_at.to_rfc3339())
        .bind(&secret.updated_by)
        .bind(secret.last_rotated_at.to_rfc3339())
        .bind(secret.rotation_due_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        self.by_id.insert(secret.id.clone(), secret.clone());
        Ok(())
    }
}

/// `SecretEngine` calls `insert`/`update` synchronously, but the row has to
/// reach the database. These blocking writes are the one place in this crate
/// that breaks the "sync methods only ever touch the cache" rule -- there is
/// no async entry point in `SecretStore` to write through on instead. A
/// production deployment behind a genuinely async call stack should prefer
/// `SqlSecretStore::persist` directly where an async context is available
/// and treat `insert`/`update` as a synchronous fallback. Requires a
/// multi-threaded tokio runtime; `block_in_place` panics on the default
/// current-thread flavor.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

impl SecretStore for SqlSecretStore {
    fn find_active_by_name(&self, workspace_id: &str, name: &str) -> Option<Secret> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .find(|secret| secret.workspace_id == workspace_id && secret.name == name && secret.is_active)
    }

    fn get(&self, id: &str) -> Option<Secret> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    fn insert(&self, secret: Secret) {
        if let Err(err) = block_on(self.persist(&secret)) {
            tracing::error!(secret_id = %secret.id, error = %err, "failed to persist new secret");
        }
    }

    fn update(&self, secret: Secret) {
        if let Err(err) = block_on(self.persist(&secret)) {
            tracing::error!(secret_id = %secret.id, error = %err, "failed to persist secret update");
        }
    }

    fn list(&self, workspace_id: &str) -> Vec<Secret> {
        self.by_id.iter().map(|entry| entry.value().clone()).filter(|secret| secret.workspace_id == workspace_id).collect()
    }
}

pub struct SqlWorkspaceDirectory {
    pool: StatePool,
    known: DashSet<String>,
}

impl SqlWorkspaceDirectory {
    pub fn new(pool: StatePool) -> Self {
        Self { pool, known: DashSet::new() }
    }

    pub async fn refresh(&self) -> Result<()> {
        let rows = sqlx::query("SELECT id FROM workspaces").fetch_all(&self.pool).await?;
        self.known.clear();
        for row in rows {
            let id: String = row.try_get("id")?;
            self.known.insert(id);
        }
        Ok(())
    }

    pub async fn register(&self, workspace_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO workspaces (id) VALUES (?) ON CONFLICT (id) DO NOTHING")
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        self.known.insert(workspace_id.to_string());
        Ok(())
    }
}

impl WorkspaceDirectory for SqlWorkspaceDirectory {
    fn exists(&self, workspace_id: &str) -> bool {
        self.known.contains(workspace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ensure_schema;
    use sqlx::any::AnyPoolOptions;
    use std::collections::HashMap;

    async fn pool() -> StatePool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    fn sample(id: &str, workspace_id: &str, name: &str) -> Secret {
        let now = Utc::now();
        Secret {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            secret_type: "api_key".to_string(),
            encrypted_value: "ciphertext".to_string(),
            rotation_policy: RotationPolicy::Auto90d,
            last_rotated_at: now,
            rotation_due_at: RotationPolicy::Auto90d.due_from(now),
            tags: vec!["prod".to_string()],
            metadata: HashMap::new(),
            is_active: true,
            created_at: now,
            created_by: "user-1".to_string(),
            updated_at: now,
            updated_by: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn workspace_directory_reports_registered_workspaces_only() {
        let directory = SqlWorkspaceDirectory::new(pool().await);
        assert!(!directory.exists("ws-1"));
        directory.register("ws-1").await.unwrap();
        assert!(directory.exists("ws-1"));
    }

    #[tokio::test]
    async fn workspace_directory_refresh_reads_other_writers() {
        let shared = pool().await;
        let writer = SqlWorkspaceDirectory::new(shared.clone());
        writer.register("ws-2").await.unwrap();

        let reader = SqlWorkspaceDirectory::new(shared);
        assert!(!reader.exists("ws-2"));
        reader.refresh().await.unwrap();
        assert!(reader.exists("ws-2"));
    }

    #[tokio::test]
    async fn insert_then_refresh_from_a_second_store_sees_the_row() {
        let shared = pool().await;
        let writer = SqlSecretStore::new(shared.clone());
        writer.persist(&sample("secret-1", "ws-1", "openai-key")).await.unwrap();

        let reader = SqlSecretStore::new(shared);
        assert!(reader.get("secret-1").is_none());
        reader.refresh().await.unwrap();

        let fetched = reader.get("secret-1").expect("secret present after refresh");
        assert_eq!(fetched.name, "openai-key");
        assert_eq!(reader.find_active_by_name("ws-1", "openai-key").unwrap().id, "secret-1");
        assert_eq!(reader.list("ws-1").len(), 1);
    }

    // `block_in_place` requires a multi-threaded runtime; the default
    // single-threaded `#[tokio::test]` flavor can't host it.
    #[tokio::test(flavor = "multi_thread")]
    async fn sync_insert_writes_through_to_the_database() {
        let shared = pool().await;
        let store = SqlSecretStore::new(shared.clone());
        store.insert(sample("secret-2", "ws-1", "anthropic-key"));

        // Confirm the write landed in the database, not just the cache.
        let reader = SqlSecretStore::new(shared);
        reader.refresh().await.unwrap();
        assert!(reader.get("secret-2").is_some());
    }
}
