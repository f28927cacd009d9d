// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow execution engine.
//!
//! Runs a `WorkflowDefinition` against one `WorkflowContext`, dispatching
//! steps layer by layer according to `dependency_resolver::get_parallel_execution_groups`
//! so independent steps within a layer execute concurrently under Tokio,
//! while layers themselves run in dependency order.

use crate::context::WorkflowContext;
use crate::controller::MultiAgentController;
use crate::dependency_resolver::{self, ValidationResult};
use crate::error::WorkflowError;
use crate::events::{emit, EventBroadcasterRef, EventType, WorkflowEvent};
use crate::llm_service::{GenerateContext, LLMService};
use crate::providers::GenerateParams;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::workflow::{StepExecutionStatus, StepType, WorkflowDefinition, WorkflowExecutionStatus, WorkflowStep};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one step attempt, as recorded for the caller.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepExecutionStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration: Duration,
}

/// A single workflow run: the definition it executes, the shared context
/// every step reads/writes, and the per-step status/result tracking tables.
///
/// The context lives behind a mutex (spec §5): every step handler sees a
/// consistent snapshot without the engine needing one process-wide lock,
/// because each execution gets its own `WorkflowContext` instance.
pub struct WorkflowExecutor {
    definition: Arc<WorkflowDefinition>,
    context: Arc<Mutex<WorkflowContext>>,
    execution_id: String,
    status: Arc<SyncMutex<WorkflowExecutionStatus>>,
    step_results: DashMap<String, StepResult>,
    llm_service: Option<Arc<LLMService>>,
    controller: Option<Arc<MultiAgentController>>,
    broadcaster: Option<EventBroadcasterRef>,
    max_failover_attempts: u32,
}

impl WorkflowExecutor {
    pub fn new(definition: WorkflowDefinition, context: WorkflowContext) -> Result<Self, WorkflowError> {
        let validation: ValidationResult = dependency_resolver::validate(&definition.steps);
        if !validation.is_valid() {
            return Err(WorkflowError::Dependency(
                validation
                    .errors
                    .into_iter()
                    .next()
                    .expect("is_valid() false implies a non-empty errors vec"),
            ));
        }

        let execution_id = context.workflow_execution_id.clone();

        Ok(Self {
            definition: Arc::new(definition),
            context: Arc::new(Mutex::new(context)),
            execution_id,
            status: Arc::new(SyncMutex::new(WorkflowExecutionStatus::Pending)),
            step_results: DashMap::new(),
            llm_service: None,
            controller: None,
            broadcaster: None,
            max_failover_attempts: 3,
        })
    }

    pub fn with_llm_service(mut self, service: Arc<LLMService>) -> Self {
        self.llm_service = Some(service);
        self
    }

    pub fn with_controller(mut self, controller: Arc<MultiAgentController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: EventBroadcasterRef) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_max_failover_attempts(mut self, max: u32) -> Self {
        self.max_failover_attempts = max;
        self
    }

    fn set_status(&self, status: WorkflowExecutionStatus) {
        *self.status.lock() = status;
    }

    pub fn status(&self) -> WorkflowExecutionStatus {
        *self.status.lock()
    }

    async fn emit(&self, event_type: EventType, message: impl Into<String>, step_id: Option<String>) {
        let Some(broadcaster) = &self.broadcaster else { return };
        let mut event = WorkflowEvent::new(
            event_type,
            self.execution_id.clone(),
            self.definition.id.clone(),
            self.definition.workspace_id.clone(),
            message,
        );
        if let Some(step_id) = step_id {
            event = event.with_step_id(step_id);
        }
        emit(broadcaster, event).await;
    }

    /// Runs the workflow to completion, executing each parallel-execution
    /// layer's steps concurrently and layers themselves in dependency order.
    /// A failed required step halts the run; later layers are not started.
    pub async fn execute(&self) -> Result<Vec<StepResult>, WorkflowError> {
        self.set_status(WorkflowExecutionStatus::Running);
        self.emit(EventType::WorkflowStarted, "workflow execution started", None).await;
        info!(execution_id = %self.execution_id, workflow_id = %self.definition.id, "starting workflow execution");

        let groups = dependency_resolver::get_parallel_execution_groups(&self.definition.steps)?;

        let mut halted = false;
        for group in groups {
            if halted {
                for step in &group {
                    self.mark_skipped(step).await;
                }
                continue;
            }

            let mut handles = Vec::with_capacity(group.len());
            for step in group {
                if !self.should_execute(&step).await {
                    self.mark_skipped(&step).await;
                    continue;
                }
                let executor = self.clone_for_step();
                let step = step.clone();
                handles.push(tokio::spawn(async move { executor.execute_step(&step).await }));
            }

            for handle in handles {
                match handle.await {
                    Ok(result) => {
                        if result.status == StepExecutionStatus::Failed {
                            halted = true;
                        }
                        self.step_results.insert(result.step_id.clone(), result);
                    }
                    Err(join_err) => {
                        error!(error = %join_err, "step task panicked");
                        halted = true;
                    }
                }
            }
        }

        let results: Vec<StepResult> = self.step_results.iter().map(|entry| entry.value().clone()).collect();
        let final_status = if halted {
            WorkflowExecutionStatus::Failed
        } else {
            WorkflowExecutionStatus::Completed
        };
        self.set_status(final_status);

        if halted {
            self.emit(EventType::WorkflowFailed, "workflow execution failed", None).await;
            warn!(execution_id = %self.execution_id, "workflow completed with failures");
        } else {
            self.emit(EventType::WorkflowCompleted, "workflow execution completed", None).await;
            info!(execution_id = %self.execution_id, "workflow completed successfully");
        }

        Ok(results)
    }

    /// A shallow clone sharing the same context mutex, result table, and
    /// collaborators -- cheap enough to create one per spawned step task.
    fn clone_for_step(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            context: self.context.clone(),
            execution_id: self.execution_id.clone(),
            status: self.status.clone(),
            step_results: self.step_results.clone(),
            llm_service: self.llm_service.clone(),
            controller: self.controller.clone(),
            broadcaster: self.broadcaster.clone(),
            max_failover_attempts: self.max_failover_attempts,
        }
    }

    async fn should_execute(&self, step: &WorkflowStep) -> bool {
        let Some(expr) = &step.condition_expression else { return true };
        let context = self.context.lock().await;
        evaluate_condition(expr, &context)
    }

    async fn mark_skipped(&self, step: &WorkflowStep) {
        {
            let mut context = self.context.lock().await;
            context.set_step_skipped(step.id.clone());
        }
        self.emit(EventType::StepSkipped, format!("step '{}' skipped", step.name), Some(step.id.clone()))
            .await;
        self.step_results.insert(
            step.id.clone(),
            StepResult {
                step_id: step.id.clone(),
                status: StepExecutionStatus::Skipped,
                output: None,
                error: None,
                duration: Duration::ZERO,
            },
        );
    }

    async fn execute_step(&self, step: &WorkflowStep) -> StepResult {
        let started = Instant::now();
        info!(step_id = %step.id, step_type = ?step.step_type, "executing step");
        self.emit(EventType::StepStarted, format!("step '{}' started", step.name), Some(step.id.clone())).await;

        let retry_policy = RetryPolicy::new(
            self.definition.step_max_retries(step).max(1),
            Duration::from_millis(500),
            2.0,
            Duration::from_secs(30),
        );
        let retry_executor = RetryExecutor::new(retry_policy);
        let timeout_duration = Duration::from_secs(self.definition.step_timeout(step));

        let step_execution_id = format!("{}:{}", self.execution_id, step.id);
        let result = retry_executor
            .execute(|| async {
                match timeout(timeout_duration, self.run_step(step, &step_execution_id)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(WorkflowError::StepTimeout(step.id.clone())),
                }
            })
            .await;

        let duration = started.elapsed();
        match result {
            Ok(output) => {
                {
                    let mut context = self.context.lock().await;
                    context.set_step_output(step.id.clone(), output.clone());
                }
                self.emit(EventType::StepCompleted, format!("step '{}' completed", step.name), Some(step.id.clone()))
                    .await;
                info!(step_id = %step.id, duration_ms = duration.as_millis(), "step completed");
                StepResult {
                    step_id: step.id.clone(),
                    status: StepExecutionStatus::Completed,
                    output: Some(output),
                    error: None,
                    duration,
                }
            }
            Err(err) => {
                {
                    let mut context = self.context.lock().await;
                    context.set_step_failed(step.id.clone());
                }
                self.emit(EventType::StepFailed, format!("step '{}' failed: {err}", step.name), Some(step.id.clone()))
                    .await;
                error!(step_id = %step.id, error = %err, "step failed");
                StepResult {
                    step_id: step.id.clone(),
                    status: StepExecutionStatus::Failed,
                    output: None,
                    error: Some(err.to_string()),
                    duration,
                }
            }
        }
    }

    async fn run_step(&self, step: &WorkflowStep, step_execution_id: &str) -> Result<Value, WorkflowError> {
        match step.step_type {
            StepType::Task => self.run_task_step(step).await,
            StepType::Agent => self.run_agent_step(step, step_execution_id).await,
            StepType::Condition => self.run_condition_step(step).await,
            StepType::Sequential | StepType::Parallel => {
                // Sequencing/fan-out is handled by the layering in `execute`;
                // a bare sequential/parallel node has no work of its own.
                Ok(Value::Object(Default::default()))
            }
        }
    }

    async fn run_task_step(&self, step: &WorkflowStep) -> Result<Value, WorkflowError> {
        let Some(service) = &self.llm_service else {
            return Err(WorkflowError::Persistence("no LLM service configured for task step".to_string()));
        };

        let inputs = {
            let context = self.context.lock().await;
            step.inputs()
                .into_iter()
                .map(|(name, reference)| {
                    let value = context.get_step_input(&reference, None).unwrap_or_else(|| Value::String(reference));
                    (name, value)
                })
                .collect::<std::collections::HashMap<_, _>>()
        };

        let prompt = step
            .config
            .get("prompt")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| serde_json::to_string(&inputs).unwrap_or_default());

        let params = GenerateParams {
            model: step.config.get("model").and_then(|v| v.as_str()).map(String::from),
            temperature: step
                .config
                .get("temperature")
                .and_then(|v| v.as_f64())
                .map(|v| v as f32)
                .unwrap_or(0.7),
            max_tokens: step.config.get("max_tokens").and_then(|v| v.as_u64()).unwrap_or(2000) as u32,
            extra: Default::default(),
        };

        let generate_context = {
            let context = self.context.lock().await;
            GenerateContext {
                workspace_id: Some(context.workspace_id.clone()),
                execution_id: Some(self.execution_id.clone()),
                ..Default::default()
            }
        };

        let response = service
            .generate(&prompt, &params, &generate_context)
            .await
            .map_err(WorkflowError::Provider)?;

        Ok(serde_json::json!({
            "content": response.content,
            "model": response.model,
            "provider": response.provider,
            "tokens_total": response.tokens_total,
            "cost_usd": response.cost_usd,
        }))
    }

    async fn run_agent_step(&self, step: &WorkflowStep, step_execution_id: &str) -> Result<Value, WorkflowError> {
        let Some(controller) = &self.controller else {
            return Err(WorkflowError::Persistence("no agent controller configured for agent step".to_string()));
        };

        let context = self.context.lock().await;
        let assignment = controller
            .assign_with_failover(step, &context, step_execution_id, self.max_failover_attempts)
            .map_err(WorkflowError::Controller)?;
        drop(context);

        self.emit(
            EventType::AgentActivity,
            format!("agent '{}' assigned to step '{}'", assignment.agent_definition.name, step.name),
            Some(step.id.clone()),
        )
        .await;

        Ok(serde_json::json!({
            "agent_instance_id": assignment.instance_id,
            "agent_definition_id": assignment.definition_id,
        }))
    }

    async fn run_condition_step(&self, step: &WorkflowStep) -> Result<Value, WorkflowError> {
        let context = self.context.lock().await;
        let matched = step
            .condition_expression
            .as_deref()
            .map(|expr| evaluate_condition(expr, &context))
            .unwrap_or(true);
        Ok(serde_json::json!({ "matched": matched }))
    }
}

/// Resolves a condition expression against the workflow variables/outputs.
///
/// A `${name}` reference strips the wrapper and looks `name` up as a step
/// input (falling back through the same three tiers `get_step_input` does),
/// then tests the resolved value for truthiness. Anything else is compared
/// case-insensitively against the literal grammar `true`/`1`/`yes`/`on`.
fn evaluate_condition(expr: &str, context: &WorkflowContext) -> bool {
    let expr = expr.trim();

    if let Some(var_name) = expr.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        return context
            .get_step_input(var_name, None)
            .map(is_truthy)
            .unwrap_or(false);
    }

    matches!(expr.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Python-style truthiness over the JSON values a step input can resolve
/// to: `false`/`null`, empty strings/arrays/objects, and `0` are falsy.
fn is_truthy(value: Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Generates a fresh execution id for a new workflow run.
pub fn new_execution_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{StepType, WorkflowStep};
    use std::collections::HashMap;

    fn linear_workflow() -> WorkflowDefinition {
        let step_a = WorkflowStep::new("a", "A", 1, StepType::Condition).with_condition("true");
        let step_b = WorkflowStep::new("b", "B", 2, StepType::Condition)
            .with_depends_on(["a".to_string()])
            .with_condition("false");
        WorkflowDefinition::new("wf-1", "ws-1", "proj-1", "linear").with_steps(vec![step_a, step_b])
    }

    #[tokio::test]
    async fn condition_steps_execute_without_collaborators() {
        let definition = linear_workflow();
        let context = WorkflowContext::new("exec-1", "ws-1", "proj-1", HashMap::new());
        let executor = WorkflowExecutor::new(definition, context).unwrap();
        let results = executor.execute().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.step_id == "a" && r.status == StepExecutionStatus::Completed));
        assert!(results.iter().any(|r| r.step_id == "b" && r.status == StepExecutionStatus::Completed));
        assert_eq!(executor.status(), WorkflowExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn task_step_without_llm_service_fails_the_run() {
        let step = WorkflowStep::new("t1", "T1", 1, StepType::Task);
        let definition = WorkflowDefinition::new("wf-2", "ws-1", "proj-1", "task-only").with_steps(vec![step]);
        let context = WorkflowContext::new("exec-2", "ws-1", "proj-1", HashMap::new());
        let executor = WorkflowExecutor::new(definition, context).unwrap();
        let results = executor.execute().await.unwrap();
        assert_eq!(results[0].status, StepExecutionStatus::Failed);
        assert_eq!(executor.status(), WorkflowExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn a_failed_step_skips_steps_depending_on_it() {
        let step_a = WorkflowStep::new("a", "A", 1, StepType::Task);
        let step_b = WorkflowStep::new("b", "B", 2, StepType::Condition).with_depends_on(["a".to_string()]);
        let definition = WorkflowDefinition::new("wf-3", "ws-1", "proj-1", "fail-chain").with_steps(vec![step_a, step_b]);
        let context = WorkflowContext::new("exec-3", "ws-1", "proj-1", HashMap::new());
        let executor = WorkflowExecutor::new(definition, context).unwrap();
        let results = executor.execute().await.unwrap();
        let b = results.iter().find(|r| r.step_id == "b").unwrap();
        assert_eq!(b.status, StepExecutionStatus::Skipped);
    }

    #[test]
    fn variable_reference_resolves_truthiness_through_the_wrapper() {
        let mut vars = HashMap::new();
        vars.insert("approved".to_string(), serde_json::json!(true));
        vars.insert("reviewer".to_string(), serde_json::json!(""));
        let context = WorkflowContext::new("exec", "ws", "proj", vars);
        assert!(evaluate_condition("${approved}", &context));
        assert!(!evaluate_condition("${reviewer}", &context));
    }

    #[test]
    fn unresolved_reference_is_falsy() {
        let context = WorkflowContext::new("exec", "ws", "proj", HashMap::new());
        assert!(!evaluate_condition("${missing}", &context));
    }

    #[test]
    fn bare_literal_grammar_is_recognized_case_insensitively() {
        let context = WorkflowContext::new("exec", "ws", "proj", HashMap::new());
        for truthy in ["true", "TRUE", "1", "yes", "on", "On"] {
            assert!(evaluate_condition(truthy, &context), "{truthy} should be truthy");
        }
        for falsy in ["false", "0", "no", "off", "env == prod"] {
            assert!(!evaluate_condition(falsy, &context), "{falsy} should be falsy");
        }
    }
}
