// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persists and recovers `WorkflowExecutor` runs across process restarts.
//!
//! The engine itself (`llm-orchestrator-core::executor`) keeps no
//! persistence dependency -- this store implements the `ExecutionStore`
//! collaborator the integration façade depends on to record execution state,
//! so that executions still `running` when a process dies can be found
//! again on the next startup and either resumed or marked failed.

use crate::error::{Result as StateResult, StateError};
use crate::pool::StatePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use llm_orchestrator_core::context::WorkflowContext;
use llm_orchestrator_core::error::WorkflowError;
use llm_orchestrator_core::facade::{ExecutionStore, WorkflowExecutionRecord};
use llm_orchestrator_core::workflow::WorkflowExecutionStatus;
use serde_json::Value;
use sqlx::Row;

fn to_workflow_error(err: StateError) -> WorkflowError {
    WorkflowError::Persistence(err.to_string())
}

fn status_to_str(status: WorkflowExecutionStatus) -> &'static str {
    match status {
        WorkflowExecutionStatus::Pending => "pending",
        WorkflowExecutionStatus::Running => "running",
        WorkflowExecutionStatus::WaitingForDependencies => "waiting_for_dependencies",
        WorkflowExecutionStatus::Paused => "paused",
        WorkflowExecutionStatus::Completed => "completed",
        WorkflowExecutionStatus::Failed => "failed",
        WorkflowExecutionStatus::Cancelled => "cancelled",
        WorkflowExecutionStatus::Timeout => "timeout",
    }
}

fn status_from_str(raw: &str) -> WorkflowExecutionStatus {
    match raw {
        "pending" => WorkflowExecutionStatus::Pending,
        "running" => WorkflowExecutionStatus::Running,
        "waiting_for_dependencies" => WorkflowExecutionStatus::WaitingForDependencies,
        "paused" => WorkflowExecutionStatus::Paused,
        "completed" => WorkflowExecutionStatus::Completed,
        "failed" => WorkflowExecutionStatus::Failed,
        "cancelled" => WorkflowExecutionStatus::Cancelled,
        _ => WorkflowExecutionStatus::Timeout,
    }
}

pub struct SqlExecutionStore {
    pool: StatePool,
}

impl SqlExecutionStore {
    pub fn new(pool: StatePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::any::AnyRow) -> StateResult<WorkflowExecutionRecord> {
        let context_json: String = row.try_get("context_json").map_err(StateError::from)?;
        let context: WorkflowContext = serde_json::from_str(&context_json)?;

        let result_json: Option<String> = row.try_get("result_json").map_err(StateError::from)?;
        let result = result_json.map(|s| serde_json::from_str(&s)).transpose()?;

        let status_str: String = row.try_get("status").map_err(StateError::from)?;
        let started_at_str: String = row.try_get("started_at").map_err(StateError::from)?;
        let finished_at_str: Option<String> = row.try_get("finished_at").map_err(StateError::from)?;

        Ok(WorkflowExecutionRecord {
            execution_id: row.try_get("execution_id").map_err(StateError::from)?,
            workflow_id: row.try_get("workflow_id").map_err(StateError::from)?,
            workspace_id: row.try_get("workspace_id").map_err(StateError::from)?,
            project_id: row.try_get("project_id").map_err(StateError::from)?,
            status: status_from_str(&status_str),
            context,
            result,
            error_message: row.try_get("error_message").map_err(StateError::from)?,
            started_at: DateTime::parse_from_rfc3339(&started_at_str)
                .map_err(|e| StateError::Query(e.to_string()))?
                .with_timezone(&Utc),
            finished_at: finished_at_str
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                .transpose()
                .map_err(|e| StateError::Query(e.to_string()))?,
        })
    }

    async fn save_impl(&self, record: &WorkflowExecutionRecord) -> StateResult<()> {
        let context_json = serde_json::to_string(&record.context)?;
        let result_json = record.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                execution_id, workflow_id, workspace_id, project_id, status,
                context_json, result_json, error_message, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.execution_id)
        .bind(&record.workflow_id)
        .bind(&record.workspace_id)
        .bind(&record.project_id)
        .bind(status_to_str(record.status))
        .bind(context_json)
        .bind(result_json)
        .bind(&record.error_message)
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status_impl(
        &self,
        execution_id: &str,
        status: WorkflowExecutionStatus,
        result: Option<Value>,
        error_message: Option<String>,
    ) -> StateResult<()> {
        let result_json = result.as_ref().map(serde_json::to_string).transpose()?;
        let finished_at = status.is_terminal().then(|| Utc::now().to_rfc3339());

        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = ?, result_json = ?, error_message = ?, finished_at = COALESCE(?, finished_at)
            WHERE execution_id = ?
            "#,
        )
        .bind(status_to_str(status))
        .bind(result_json)
        .bind(error_message)
        .bind(finished_at)
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_impl(&self, execution_id: &str) -> StateResult<Option<WorkflowExecutionRecord>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE execution_id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list_running_impl(&self) -> StateResult<Vec<WorkflowExecutionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE status IN ('pending', 'running', 'waiting_for_dependencies', 'paused')",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl ExecutionStore for SqlExecutionStore {
    async fn save(&self, record: &WorkflowExecutionRecord) -> Result<(), WorkflowError> {
        self.save_impl(record).await.map_err(to_workflow_error)
    }

    async fn update_status(
        &self,
        execution_id: &str,
        status: WorkflowExecutionStatus,
        result: Option<Value>,
        error_message: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.update_status_impl(execution_id, status, result, error_message).await.map_err(to_workflow_error)
    }

    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecutionRecord>, WorkflowError> {
        self.get_impl(execution_id).await.map_err(to_workflow_error)
    }

    async fn list_running(&self) -> Result<Vec<WorkflowExecutionRecord>, WorkflowError> {
        self.list_running_impl().await.map_err(to_workflow_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{connect, ensure_schema};
    use std::collections::HashMap;

    async fn test_pool() -> StatePool {
        let pool = connect("sqlite::memory:?cache=shared").await.expect("connect to in-memory sqlite");
        ensure_schema(&pool).await.expect("create schema");
        pool
    }

    fn sample_record(execution_id: &str, status: WorkflowExecutionStatus) -> WorkflowExecutionRecord {
        WorkflowExecutionRecord {
            execution_id: execution_id.to_string(),
            workflow_id: "wf-1".to_string(),
            workspace_id: "ws-1".to_string(),
            project_id: "proj-1".to_string(),
            status,
            context: WorkflowContext::new(execution_id, "ws-1", "proj-1", HashMap::new()),
            result: None,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let store = SqlExecutionStore::new(test_pool().await);
        let record = sample_record("exec-1", WorkflowExecutionStatus::Running);
        store.save(&record).await.unwrap();

        let fetched = store.get("exec-1").await.unwrap().expect("record exists");
        assert_eq!(fetched.workflow_id, "wf-1");
        assert_eq!(fetched.status, WorkflowExecutionStatus::Running);
    }

    #[tokio::test]
    async fn list_running_excludes_terminal_executions() {
        let store = SqlExecutionStore::new(test_pool().await);
        store.save(&sample_record("exec-running", WorkflowExecutionStatus::Running)).await.unwrap();
        store.save(&sample_record("exec-done", WorkflowExecutionStatus::Completed)).await.unwrap();

        let running = store.list_running().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].execution_id, "exec-running");
    }

    #[tokio::test]
    async fn update_status_sets_finished_at_on_terminal_transition() {
        let store = SqlExecutionStore::new(test_pool().await);
        store.save(&sample_record("exec-2", WorkflowExecutionStatus::Running)).await.unwrap();

        store
            .update_status("exec-2", WorkflowExecutionStatus::Completed, Some(serde_json::json!({"ok": true})), None)
            .await
            .unwrap();

        let fetched = store.get("exec-2").await.unwrap().unwrap();
        assert_eq!(fetched.status, WorkflowExecutionStatus::Completed);
        assert!(fetched.finished_at.is_some());
        assert_eq!(fetched.result, Some(serde_json::json!({"ok": true})));
    }
}
