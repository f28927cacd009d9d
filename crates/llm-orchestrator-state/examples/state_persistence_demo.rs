// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Demonstrates the restart-recovery flow `ExecutionStore` exists for:
//! an execution is marked `running`, the process "restarts" (a fresh pool
//! is opened against the same SQLite file), and the new process finds the
//! orphaned execution via `list_running` before deciding what to do with it.

use llm_orchestrator_core::context::WorkflowContext;
use llm_orchestrator_core::workflow::WorkflowExecutionStatus;
use llm_orchestrator_state::execution_store::SqlExecutionStore;
use llm_orchestrator_state::{connect, ensure_schema, ExecutionStore, WorkflowExecutionRecord};
use std::collections::HashMap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let db_file = tempfile::NamedTempFile::new()?;
    let database_url = format!("sqlite://{}", db_file.path().display());

    // First "process": starts a workflow execution and crashes mid-run.
    {
        let pool = connect(&database_url).await?;
        ensure_schema(&pool).await?;
        let store = SqlExecutionStore::new(pool);

        let context = WorkflowContext::new("exec-1", "ws-demo", "proj-demo", HashMap::new());
        let record = WorkflowExecutionRecord {
            execution_id: "exec-1".to_string(),
            workflow_id: "wf-onboarding".to_string(),
            workspace_id: "ws-demo".to_string(),
            project_id: "proj-demo".to_string(),
            status: WorkflowExecutionStatus::Running,
            context,
            result: None,
            error_message: None,
            started_at: chrono::Utc::now(),
            finished_at: None,
        };
        store.save(&record).await?;
        println!("process 1: saved execution {} as running, then \"crashed\"", record.execution_id);
    }

    // Second "process": reopens the same database and recovers.
    {
        let pool = connect(&database_url).await?;
        let store = SqlExecutionStore::new(pool);

        let orphaned = store.list_running().await?;
        println!("process 2: found {} execution(s) still running after restart", orphaned.len());
        for record in &orphaned {
            println!("  - {} (workflow {}), started at {}", record.execution_id, record.workflow_id, record.started_at);
        }

        for record in &orphaned {
            store
                .update_status(
                    &record.execution_id,
                    WorkflowExecutionStatus::Failed,
                    None,
                    Some("orchestrator restarted mid-execution".to_string()),
                )
                .await?;
        }

        let still_running = store.list_running().await?;
        println!("process 2: {} execution(s) still running after recovery sweep", still_running.len());
    }

    Ok(())
}
