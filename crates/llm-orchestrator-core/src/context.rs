// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-execution shared state: variables, step outputs, and step statuses.
//!
//! One `WorkflowContext` is created per workflow execution and confined
//! behind a mutex so every step handler sees a consistent view without the
//! engine needing a single global lock (spec §5).

use crate::workflow::StepExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Shared execution-scoped state threaded through every step of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_execution_id: String,
    pub workspace_id: String,
    pub project_id: String,
    pub variables: HashMap<String, Value>,
    pub step_outputs: HashMap<String, Value>,
    pub step_statuses: HashMap<String, StepExecutionStatus>,
    pub started_at: DateTime<Utc>,
    pub parent_execution_id: Option<String>,
}

impl WorkflowContext {
    pub fn new(
        workflow_execution_id: impl Into<String>,
        workspace_id: impl Into<String>,
        project_id: impl Into<String>,
        variables: HashMap<String, Value>,
    ) -> Self {
        Self {
            workflow_execution_id: workflow_execution_id.into(),
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
            variables,
            step_outputs: HashMap::new(),
            step_statuses: HashMap::new(),
            started_at: Utc::now(),
            parent_execution_id: None,
        }
    }

    pub fn with_parent_execution_id(mut self, id: impl Into<String>) -> Self {
        self.parent_execution_id = Some(id.into());
        self
    }

    /// Resolves a step input through three tiers, same order as the engine
    /// this was ported from: a `steps.<id>.<field>` dotted reference pulls
    /// from a previously completed step's output; failing that, a workflow
    /// variable of the same name; failing that, `input_name` itself is
    /// returned as a literal value rather than dropped, unless `default`
    /// was given, which then takes its place.
    pub fn get_step_input(&self, input_name: &str, default: Option<Value>) -> Option<Value> {
        if let Some(rest) = input_name.strip_prefix("steps.") {
            let mut parts = rest.splitn(2, '.');
            let referenced_step_id = parts.next().unwrap_or_default();
            let field = parts.next();

            return match self.step_outputs.get(referenced_step_id) {
                Some(output) => match field {
                    Some(field) => output.get(field).cloned().or(default),
                    None => Some(output.clone()),
                },
                None => default,
            };
        }

        if let Some(value) = self.variables.get(input_name) {
            return Some(value.clone());
        }

        default.or_else(|| Some(Value::String(input_name.to_string())))
    }

    pub fn set_step_output(&mut self, step_id: impl Into<String>, output: Value) {
        let step_id = step_id.into();
        self.step_outputs.insert(step_id.clone(), output);
        self.step_statuses.insert(step_id, StepExecutionStatus::Completed);
    }

    pub fn set_step_failed(&mut self, step_id: impl Into<String>) {
        self.step_statuses.insert(step_id.into(), StepExecutionStatus::Failed);
    }

    pub fn set_step_skipped(&mut self, step_id: impl Into<String>) {
        self.step_statuses.insert(step_id.into(), StepExecutionStatus::Skipped);
    }

    pub fn completed_step_ids(&self) -> std::collections::HashSet<String> {
        self.step_statuses
            .iter()
            .filter(|(_, status)| **status == StepExecutionStatus::Completed)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> WorkflowContext {
        let mut vars = HashMap::new();
        vars.insert("greeting".to_string(), json!("hello"));
        WorkflowContext::new("exec-1", "ws-1", "proj-1", vars)
    }

    #[test]
    fn resolves_plain_variable() {
        let context = ctx();
        assert_eq!(context.get_step_input("greeting", None), Some(json!("hello")));
    }

    #[test]
    fn resolves_step_output_field() {
        let mut context = ctx();
        context.set_step_output("a", json!({"result": "ok", "count": 3}));
        assert_eq!(context.get_step_input("steps.a.result", None), Some(json!("ok")));
        assert_eq!(context.get_step_input("steps.a.count", None), Some(json!(3)));
    }

    #[test]
    fn missing_reference_falls_back_to_default() {
        let context = ctx();
        let default = json!("fallback");
        assert_eq!(
            context.get_step_input("steps.missing.field", Some(default.clone())),
            Some(default)
        );
    }

    #[test]
    fn unresolved_reference_passes_through_as_a_literal() {
        let context = ctx();
        assert_eq!(context.get_step_input("gpt-4", None), Some(json!("gpt-4")));
    }

    #[test]
    fn set_step_output_marks_completed() {
        let mut context = ctx();
        context.set_step_output("a", json!({}));
        assert_eq!(context.step_statuses.get("a"), Some(&StepExecutionStatus::Completed));
        assert!(context.completed_step_ids().contains("a"));
    }
}
