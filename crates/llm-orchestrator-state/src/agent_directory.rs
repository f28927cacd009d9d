// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database-backed `AgentDirectory`.
//!
//! `llm-orchestrator-core::controller::AgentDirectory` is a synchronous
//! trait -- the controller reads it on every assignment decision and can't
//! await a query there. This implementation keeps an in-memory cache
//! (refreshed from the database by an explicit async call) and serves the
//! trait's synchronous methods from that cache, the same split the teacher
//! uses between `AuditLogger`'s sync event construction and its async
//! storage writes.

use crate::error::Result;
use crate::pool::StatePool;
use dashmap::DashMap;
use llm_orchestrator_core::agents::{AgentDefinition, AgentInstance, AgentStatus};
use llm_orchestrator_core::controller::AgentDirectory;
use sqlx::Row;

fn status_to_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => "idle",
        AgentStatus::Busy => "busy",
        AgentStatus::Offline => "offline",
        AgentStatus::Error => "error",
    }
}

fn status_from_str(raw: &str) -> AgentStatus {
    match raw {
        "busy" => AgentStatus::Busy,
        "offline" => AgentStatus::Offline,
        "error" => AgentStatus::Error,
        _ => AgentStatus::Idle,
    }
}

pub struct SqlAgentDirectory {
    pool: StatePool,
    definitions: DashMap<String, AgentDefinition>,
    instances: DashMap<String, AgentInstance>,
}

impl SqlAgentDirectory {
    pub fn new(pool: StatePool) -> Self {
        Self {
            pool,
            definitions: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    /// Reloads both caches from the database. Call on startup and
    /// periodically thereafter; the controller only ever sees what's in
    /// the cache, so a stale cache means stale assignment decisions.
    pub async fn refresh(&self) -> Result<()> {
        let definition_rows = sqlx::query("SELECT * FROM agent_definitions").fetch_all(&self.pool).await?;
        self.definitions.clear();
        for row in definition_rows {
            let id: String = row.try_get("id")?;
            let capabilities_json: String = row.try_get("capabilities_json")?;
            let capabilities: Vec<String> = serde_json::from_str(&capabilities_json)?;
            let is_enabled: i64 = row.try_get("is_enabled")?;
            self.definitions.insert(
                id.clone(),
                AgentDefinition {
                    id,
                    name: row.try_get("name")?,
                    capabilities,
                    is_enabled: is_enabled != 0,
                },
            );
        }

        let instance_rows = sqlx::query("SELECT * FROM agent_instances").fetch_all(&self.pool).await?;
        self.instances.clear();
        for row in instance_rows {
            let id: String = row.try_get("id")?;
            let status_str: String = row.try_get("status")?;
            let config_json: String = row.try_get("config_json")?;
            self.instances.insert(
                id.clone(),
                AgentInstance {
                    id,
                    definition_id: row.try_get("definition_id")?,
                    workspace_id: row.try_get("workspace_id")?,
                    project_id: row.try_get("project_id")?,
                    status: status_from_str(&status_str),
                    config: serde_json::from_str(&config_json)?,
                },
            );
        }

        Ok(())
    }

    pub async fn upsert_definition(&self, definition: &AgentDefinition) -> Result<()> {
        let capabilities_json = serde_json::to_string(&definition.capabilities)?;
        sqlx::query(
            r#"
            INSERT INTO agent_definitions (id, name, capabilities_json, is_enabled)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name, capabilities_json = excluded.capabilities_json, is_enabled = excluded.is_enabled
            "#,
        )
        .bind(&definition.id)
        .bind(&definition.name)
        .bind(capabilities_json)
        .bind(definition.is_enabled as i64)
        .execute(&self.pool)
        .await?;

        self.definitions.insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    pub async fn upsert_instance(&self, instance: &AgentInstance) -> Result<()> {
        let config_json = serde_json::to_string(&instance.config)?;
        sqlx::query(
            r#"
            INSERT INTO agent_instances (id, definition_id, workspace_id, project_id, status, config_json)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                definition_id = excluded.definition_id, workspace_id = excluded.workspace_id,
                project_id = excluded.project_id, status = excluded.status, config_json = excluded.config_json
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.definition_id)
        .bind(&instance.workspace_id)
        .bind(&instance.project_id)
        .bind(status_to_str(instance.status))
        .bind(config_json)
        .execute(&self.pool)
        .await?;

        self.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    /// Writes a status change through to the database. `AgentDirectory`'s
    /// own `set_instance_status` can only update the cache synchronously;
    /// a collaborator that owns the pool should call this instead whenever
    /// it has an async context available.
    pub async fn persist_instance_status(&self, instance_id: &str, status: AgentStatus) -> Result<()> {
        sqlx::query("UPDATE agent_instances SET status = ? WHERE id = ?")
            .bind(status_to_str(status))
            .bind(instance_id)
            .execute(&self.pool)
            .await?;

        if let Some(mut instance) = self.instances.get_mut(instance_id) {
            instance.status = status;
        }
        Ok(())
    }
}

impl AgentDirectory for SqlAgentDirectory {
    fn available_instances(&self, workspace_id: &str, project_id: &str) -> Vec<AgentInstance> {
        self.instances
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|instance| instance.workspace_id == workspace_id && instance.project_id == project_id)
            .collect()
    }

    fn definition(&self, id: &str) -> Option<AgentDefinition> {
        self.definitions.get(id).map(|entry| entry.value().clone())
    }

    fn set_instance_status(&self, instance_id: &str, status: AgentStatus) {
        if let Some(mut instance) = self.instances.get_mut(instance_id) {
            instance.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ensure_schema;
    use sqlx::any::AnyPoolOptions;
    use std::collections::HashMap;

    async fn directory() -> SqlAgentDirectory {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        SqlAgentDirectory::new(pool)
    }

    #[tokio::test]
    async fn refresh_populates_caches_from_database() {
        let directory = directory().await;
        directory
            .upsert_definition(&AgentDefinition {
                id: "def-1".to_string(),
                name: "coder".to_string(),
                capabilities: vec!["code".to_string()],
                is_enabled: true,
            })
            .await
            .unwrap();
        directory
            .upsert_instance(&AgentInstance {
                id: "inst-1".to_string(),
                definition_id: "def-1".to_string(),
                workspace_id: "ws-1".to_string(),
                project_id: "proj-1".to_string(),
                status: AgentStatus::Idle,
                config: HashMap::new(),
            })
            .await
            .unwrap();

        let fresh = directory_from_same_pool(&directory).await;
        fresh.refresh().await.unwrap();

        assert!(fresh.definition("def-1").is_some());
        assert_eq!(fresh.available_instances("ws-1", "proj-1").len(), 1);
    }

    async fn directory_from_same_pool(existing: &SqlAgentDirectory) -> SqlAgentDirectory {
        SqlAgentDirectory::new(existing.pool.clone())
    }

    #[tokio::test]
    async fn set_instance_status_updates_cache_immediately() {
        let directory = directory().await;
        directory
            .upsert_instance(&AgentInstance {
                id: "inst-2".to_string(),
                definition_id: "def-1".to_string(),
                workspace_id: "ws-1".to_string(),
                project_id: "proj-1".to_string(),
                status: AgentStatus::Idle,
                config: HashMap::new(),
            })
            .await
            .unwrap();

        directory.set_instance_status("inst-2", AgentStatus::Busy);
        let instances = directory.available_instances("ws-1", "proj-1");
        assert_eq!(instances[0].status, AgentStatus::Busy);
    }
}
