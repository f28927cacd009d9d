// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration façade: wraps a [`WorkflowExecutor`] behind a background task
//! runner so a caller gets a single `execute_workflow` call that submits the
//! run, polls for a terminal status, and returns a result envelope, without
//! having to manage the `tokio::spawn`/join-handle bookkeeping itself.
//!
//! The façade depends on an [`ExecutionStore`] collaborator for everything
//! that needs to survive a process restart -- this crate never implements
//! that trait itself, the same separation the controller keeps from
//! `AgentDirectory` and the LLM service keeps from `CostLogger`.

use crate::context::WorkflowContext;
use crate::controller::AssignmentStats;
use crate::error::WorkflowError;
use crate::executor::{StepResult, WorkflowExecutor};
use crate::workflow::WorkflowExecutionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A snapshot of one workflow execution as stored between process restarts.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionRecord {
    pub execution_id: String,
    pub workflow_id: String,
    pub workspace_id: String,
    pub project_id: String,
    pub status: WorkflowExecutionStatus,
    pub context: WorkflowContext,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Collaborator the façade depends on to survive restarts. Implemented by
/// `llm-orchestrator-state`; this crate never implements it itself.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save(&self, record: &WorkflowExecutionRecord) -> Result<(), WorkflowError>;
    async fn update_status(
        &self,
        execution_id: &str,
        status: WorkflowExecutionStatus,
        result: Option<Value>,
        error_message: Option<String>,
    ) -> Result<(), WorkflowError>;
    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecutionRecord>, WorkflowError>;
    /// Executions left in a non-terminal status -- the recovery set a
    /// restarting process should inspect before accepting new work.
    async fn list_running(&self) -> Result<Vec<WorkflowExecutionRecord>, WorkflowError>;
}

/// Result envelope returned once an execution reaches a terminal status or
/// the façade's timeout elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnvelope {
    pub execution_id: String,
    pub status: WorkflowExecutionStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Snapshot of the façade's own bookkeeping plus whatever the controller
/// reports, for a single combined health/ops view.
#[derive(Debug, Clone, Default)]
pub struct FacadeStats {
    pub active_executions: usize,
    pub controller: Option<AssignmentStats>,
}

/// Runs `WorkflowExecutor`s as background tasks, persisting status
/// transitions through an `ExecutionStore` and polling it for completion.
pub struct IntegrationFacade {
    store: Arc<dyn ExecutionStore>,
    poll_interval: Duration,
    timeout: Duration,
    active: DashMap<String, JoinHandle<()>>,
}

impl IntegrationFacade {
    pub fn new(store: Arc<dyn ExecutionStore>, poll_interval: Duration, timeout: Duration) -> Self {
        Self { store, poll_interval, timeout, active: DashMap::new() }
    }

    /// Submits `executor` as a background task, records its starting state,
    /// then polls the store every `poll_interval` until the execution
    /// reaches a terminal status or `timeout` elapses. On timeout the
    /// in-flight task is aborted and the execution is marked `Timeout`.
    pub async fn execute_workflow(
        &self,
        executor: Arc<WorkflowExecutor>,
        workflow_id: String,
        workspace_id: String,
        project_id: String,
        context: WorkflowContext,
    ) -> Result<ExecutionEnvelope, WorkflowError> {
        let execution_id = context.workflow_execution_id.clone();

        self.store
            .save(&WorkflowExecutionRecord {
                execution_id: execution_id.clone(),
                workflow_id,
                workspace_id,
                project_id,
                status: WorkflowExecutionStatus::Running,
                context,
                result: None,
                error_message: None,
                started_at: Utc::now(),
                finished_at: None,
            })
            .await?;

        let store = self.store.clone();
        let task_execution_id = execution_id.clone();
        let handle = tokio::spawn(async move {
            let outcome = executor.execute().await;
            let (status, result, error) = match outcome {
                // `execute()` returns `Ok` even when individual steps failed --
                // its own halted-layers semantics are carried in each
                // `StepResult::status`, not in this outer `Result`.
                Ok(results) => {
                    let failed = results.iter().find_map(|r| r.error.as_ref());
                    let status = if failed.is_some() { WorkflowExecutionStatus::Failed } else { WorkflowExecutionStatus::Completed };
                    (status, Some(step_results_to_json(&results)), failed.cloned())
                }
                Err(err) => (WorkflowExecutionStatus::Failed, None, Some(err.to_string())),
            };
            if let Err(e) = store.update_status(&task_execution_id, status, result, error).await {
                warn!(execution_id = %task_execution_id, error = %e, "failed to persist terminal execution status");
            }
        });
        self.active.insert(execution_id.clone(), handle);

        self.await_completion(execution_id).await
    }

    async fn await_completion(&self, execution_id: String) -> Result<ExecutionEnvelope, WorkflowError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if let Some(record) = self.store.get(&execution_id).await? {
                if record.status.is_terminal() {
                    self.active.remove(&execution_id);
                    return Ok(ExecutionEnvelope {
                        execution_id,
                        status: record.status,
                        result: record.result,
                        error: record.error_message,
                    });
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(execution_id = %execution_id, "execution timed out waiting for a terminal status");
                self.cancel_workflow_execution(&execution_id).await?;
                return Ok(ExecutionEnvelope {
                    execution_id,
                    status: WorkflowExecutionStatus::Timeout,
                    result: None,
                    error: Some("execution timed out".to_string()),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Aborts the in-flight task (if still running) and marks the execution
    /// `Cancelled` in the store. A no-op on an execution id with no active
    /// task -- e.g. one that already finished or was submitted by a
    /// different process.
    pub async fn cancel_workflow_execution(&self, execution_id: &str) -> Result<(), WorkflowError> {
        if let Some((_, handle)) = self.active.remove(execution_id) {
            handle.abort();
        }
        self.store
            .update_status(execution_id, WorkflowExecutionStatus::Cancelled, None, Some("cancelled by caller".to_string()))
            .await
    }

    /// Executions this façade instance currently has a background task for.
    pub fn stats(&self) -> FacadeStats {
        FacadeStats { active_executions: self.active.len(), controller: None }
    }

    /// Executions left `running`/`pending` in the store -- the recovery set
    /// a restarting process should inspect before accepting new work, since
    /// none of them have a live background task in this process.
    pub async fn recover_orphaned_executions(&self) -> Result<Vec<WorkflowExecutionRecord>, WorkflowError> {
        let orphans = self.store.list_running().await?;
        for orphan in &orphans {
            info!(execution_id = %orphan.execution_id, "found execution left running by a prior process");
        }
        Ok(orphans)
    }
}

fn step_results_to_json(results: &[StepResult]) -> Value {
    serde_json::json!(results
        .iter()
        .map(|r| serde_json::json!({
            "step_id": r.step_id,
            "status": format!("{:?}", r.status),
            "output": r.output,
            "error": r.error,
            "duration_ms": r.duration.as_millis() as u64,
        }))
        .collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{StepType, WorkflowDefinition, WorkflowStep};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        records: Mutex<HashMap<String, WorkflowExecutionRecord>>,
    }

    #[async_trait]
    impl ExecutionStore for InMemoryStore {
        async fn save(&self, record: &WorkflowExecutionRecord) -> Result<(), WorkflowError> {
            self.records.lock().unwrap().insert(record.execution_id.clone(), record.clone());
            Ok(())
        }

        async fn update_status(
            &self,
            execution_id: &str,
            status: WorkflowExecutionStatus,
            result: Option<Value>,
            error_message: Option<String>,
        ) -> Result<(), WorkflowError> {
            let mut records = self.records.lock().unwrap();
            if let Some(record) = records.get_mut(execution_id) {
                record.status = status;
                record.result = result;
                record.error_message = error_message;
                record.finished_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecutionRecord>, WorkflowError> {
            Ok(self.records.lock().unwrap().get(execution_id).cloned())
        }

        async fn list_running(&self) -> Result<Vec<WorkflowExecutionRecord>, WorkflowError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| !r.status.is_terminal())
                .cloned()
                .collect())
        }
    }

    fn condition_only_workflow() -> WorkflowDefinition {
        let step = WorkflowStep::new("a", "A", 1, StepType::Condition).with_condition("true");
        WorkflowDefinition::new("wf-1", "ws-1", "proj-1", "demo").with_steps(vec![step])
    }

    #[tokio::test]
    async fn execute_workflow_returns_a_completed_envelope() {
        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryStore::default());
        let facade = IntegrationFacade::new(store, Duration::from_millis(10), Duration::from_secs(5));

        let context = WorkflowContext::new("exec-1", "ws-1", "proj-1", HashMap::new());
        let executor = Arc::new(WorkflowExecutor::new(condition_only_workflow(), context.clone()).unwrap());

        let envelope = facade
            .execute_workflow(executor, "wf-1".to_string(), "ws-1".to_string(), "proj-1".to_string(), context)
            .await
            .unwrap();

        assert_eq!(envelope.execution_id, "exec-1");
        assert_eq!(envelope.status, WorkflowExecutionStatus::Completed);
        assert!(envelope.result.is_some());
        assert_eq!(facade.stats().active_executions, 0);
    }

    #[tokio::test]
    async fn a_failing_step_produces_a_failed_envelope_with_an_error() {
        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryStore::default());
        let facade = IntegrationFacade::new(store, Duration::from_millis(10), Duration::from_secs(5));

        let step = WorkflowStep::new("t1", "T1", 1, StepType::Task);
        let definition = WorkflowDefinition::new("wf-2", "ws-1", "proj-1", "task-only").with_steps(vec![step]);
        let context = WorkflowContext::new("exec-2", "ws-1", "proj-1", HashMap::new());
        let executor = Arc::new(WorkflowExecutor::new(definition, context.clone()).unwrap());

        let envelope = facade
            .execute_workflow(executor, "wf-2".to_string(), "ws-1".to_string(), "proj-1".to_string(), context)
            .await
            .unwrap();

        assert_eq!(envelope.status, WorkflowExecutionStatus::Failed);
        assert!(envelope.error.is_some());
        assert!(envelope.result.is_some());
    }

    #[tokio::test]
    async fn recover_orphaned_executions_lists_non_terminal_records() {
        let store = Arc::new(InMemoryStore::default());
        store
            .save(&WorkflowExecutionRecord {
                execution_id: "exec-orphan".to_string(),
                workflow_id: "wf-3".to_string(),
                workspace_id: "ws-1".to_string(),
                project_id: "proj-1".to_string(),
                status: WorkflowExecutionStatus::Running,
                context: WorkflowContext::new("exec-orphan", "ws-1", "proj-1", HashMap::new()),
                result: None,
                error_message: None,
                started_at: Utc::now(),
                finished_at: None,
            })
            .await
            .unwrap();

        let facade = IntegrationFacade::new(store, Duration::from_millis(10), Duration::from_secs(5));
        let orphans = facade.recover_orphaned_executions().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].execution_id, "exec-orphan");
    }

    #[tokio::test]
    async fn cancel_workflow_execution_marks_the_record_cancelled() {
        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryStore::default());
        store
            .save(&WorkflowExecutionRecord {
                execution_id: "exec-cancel".to_string(),
                workflow_id: "wf-4".to_string(),
                workspace_id: "ws-1".to_string(),
                project_id: "proj-1".to_string(),
                status: WorkflowExecutionStatus::Running,
                context: WorkflowContext::new("exec-cancel", "ws-1", "proj-1", HashMap::new()),
                result: None,
                error_message: None,
                started_at: Utc::now(),
                finished_at: None,
            })
            .await
            .unwrap();
        let facade = IntegrationFacade::new(store.clone(), Duration::from_millis(10), Duration::from_secs(5));

        facade.cancel_workflow_execution("exec-cancel").await.unwrap();
        let record = store.get("exec-cancel").await.unwrap().unwrap();
        assert_eq!(record.status, WorkflowExecutionStatus::Cancelled);
    }
}
