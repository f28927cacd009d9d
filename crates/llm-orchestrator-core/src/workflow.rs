// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow graph data model: `WorkflowDefinition`, `WorkflowStep`, and the
//! enums that describe their lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Dispatch discriminant for a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Task,
    Condition,
    Parallel,
    Sequential,
    Agent,
}

/// Terminal and non-terminal states of a `WorkflowExecution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionStatus {
    Pending,
    Running,
    WaitingForDependencies,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl WorkflowExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowExecutionStatus::Completed
                | WorkflowExecutionStatus::Failed
                | WorkflowExecutionStatus::Cancelled
                | WorkflowExecutionStatus::Timeout
        )
    }
}

/// States a single step-execution passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Pending,
    Waiting,
    Running,
    Completed,
    Failed,
    Skipped,
    Retrying,
    Timeout,
    Cancelled,
}

impl StepExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepExecutionStatus::Completed
                | StepExecutionStatus::Failed
                | StepExecutionStatus::Skipped
                | StepExecutionStatus::Cancelled
                | StepExecutionStatus::Timeout
        )
    }
}

/// An optional agent selector carried by `agent`-typed steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSelector {
    pub agent_definition_id: Option<String>,
    pub agent_instance_id: Option<String>,
    pub required_capabilities: Vec<String>,
}

/// A single node in a workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub step_order: i64,
    pub step_type: StepType,
    pub condition_expression: Option<String>,
    #[serde(default)]
    pub agent_selector: AgentSelector,
    pub depends_on_steps: HashSet<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, step_order: i64, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_order,
            step_type,
            condition_expression: None,
            agent_selector: AgentSelector::default(),
            depends_on_steps: HashSet::new(),
            config: HashMap::new(),
            timeout_seconds: None,
            max_retries: None,
        }
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.depends_on_steps = deps.into_iter().collect();
        self
    }

    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.condition_expression = Some(expr.into());
        self
    }

    pub fn with_config(mut self, config: HashMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// `step.config.inputs`, as referenced by §4.5.1 input resolution.
    pub fn inputs(&self) -> HashMap<String, String> {
        self.config
            .get("inputs")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn assignment_strategy(&self) -> Option<String> {
        self.config
            .get("assignment_strategy")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

/// A named, versioned DAG of typed steps owned by a workspace/project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub workspace_id: String,
    pub project_id: String,
    pub name: String,
    pub version: u32,
    pub is_active: bool,
    pub default_timeout_seconds: u64,
    pub default_max_retries: u32,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        project_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
            name: name.into(),
            version: 1,
            is_active: true,
            default_timeout_seconds: 3600,
            default_max_retries: 3,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn step_by_id(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_timeout(&self, step: &WorkflowStep) -> u64 {
        step.timeout_seconds.unwrap_or(self.default_timeout_seconds)
    }

    pub fn step_max_retries(&self, step: &WorkflowStep) -> u32 {
        step.max_retries.unwrap_or(self.default_max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_input_parsing_reads_inputs_map() {
        let mut config = HashMap::new();
        config.insert(
            "inputs".to_string(),
            serde_json::json!({"message": "steps.a.result", "count": "total"}),
        );
        let step = WorkflowStep::new("b", "B", 2, StepType::Task).with_config(config);
        let inputs = step.inputs();
        assert_eq!(inputs.get("message").unwrap(), "steps.a.result");
        assert_eq!(inputs.get("count").unwrap(), "total");
    }

    #[test]
    fn step_timeout_falls_back_to_workflow_default() {
        let workflow = WorkflowDefinition::new("wf", "ws", "proj", "test");
        let step = WorkflowStep::new("a", "A", 1, StepType::Task);
        assert_eq!(workflow.step_timeout(&step), 3600);
    }
}
