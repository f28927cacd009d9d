// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fluent construction of `WorkflowDefinition`/`WorkflowStep` graphs.
//!
//! `WorkflowStep`'s own builder methods (`with_depends_on`, `with_condition`,
//! `with_config`) are already ergonomic for one step; what's missing for a
//! program assembling a whole workflow is a single place to collect steps
//! and hand them to `WorkflowDefinition::new(..).with_steps(..)` without the
//! caller juggling a `Vec` by hand.

use llm_orchestrator_core::workflow::{AgentSelector, StepType, WorkflowDefinition, WorkflowStep};
use serde_json::Value;
use std::collections::HashMap;

/// Builds one `WorkflowStep`. Obtained from [`WorkflowBuilder::step`].
pub struct StepBuilder {
    step: WorkflowStep,
}

impl StepBuilder {
    fn new(id: impl Into<String>, name: impl Into<String>, step_order: i64, step_type: StepType) -> Self {
        Self { step: WorkflowStep::new(id, name, step_order, step_type) }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.step = self.step.with_depends_on(deps.into_iter().map(Into::into));
        self
    }

    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.step = self.step.with_condition(expr);
        self
    }

    /// Sets `step.config.prompt`, the field `run_task_step` reads when no
    /// explicit `inputs` mapping produces a prompt string.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.step.config.insert("prompt".to_string(), Value::String(prompt.into()));
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.step.config.insert("model".to_string(), Value::String(model.into()));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.step.config.insert("temperature".to_string(), serde_json::json!(temperature));
        self
    }

    /// Adds one `steps.<id>.<field>`-style input reference under the given
    /// name, read back via `WorkflowContext::get_step_input`.
    pub fn input(mut self, name: impl Into<String>, reference: impl Into<String>) -> Self {
        let inputs = self
            .step
            .config
            .entry("inputs".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = inputs {
            map.insert(name.into(), Value::String(reference.into()));
        }
        self
    }

    pub fn config(mut self, config: HashMap<String, Value>) -> Self {
        for (key, value) in config {
            self.step.config.insert(key, value);
        }
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.step.timeout_seconds = Some(seconds);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.step.max_retries = Some(retries);
        self
    }

    pub fn agent_selector(mut self, selector: AgentSelector) -> Self {
        self.step.agent_selector = selector;
        self
    }

    pub fn build(self) -> WorkflowStep {
        self.step
    }
}

/// Collects steps into a `WorkflowDefinition`. Step order is assigned from
/// the order `step()` is called in, matching `step_order`'s role as a
/// display/tie-break field rather than the source of dependency ordering
/// (that comes from `depends_on`).
pub struct WorkflowBuilder {
    id: String,
    workspace_id: String,
    project_id: String,
    name: String,
    default_timeout_seconds: Option<u64>,
    default_max_retries: Option<u32>,
    steps: Vec<WorkflowStep>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>, workspace_id: impl Into<String>, project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
            name: name.into(),
            default_timeout_seconds: None,
            default_max_retries: None,
            steps: Vec::new(),
        }
    }

    pub fn default_timeout_seconds(mut self, seconds: u64) -> Self {
        self.default_timeout_seconds = Some(seconds);
        self
    }

    pub fn default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = Some(retries);
        self
    }

    /// Starts a new step. Its `step_order` is finalized by [`Self::add_step`]
    /// based on insertion position, not by this call.
    pub fn step(&self, id: impl Into<String>, name: impl Into<String>, step_type: StepType) -> StepBuilder {
        StepBuilder::new(id, name, 0, step_type)
    }

    /// Appends a step built via [`WorkflowBuilder::step`] and [`StepBuilder::build`],
    /// assigning `step_order` from its position among this builder's steps.
    pub fn add_step(mut self, mut step: WorkflowStep) -> Self {
        step.step_order = self.steps.len() as i64 + 1;
        self.steps.push(step);
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new(self.id, self.workspace_id, self.project_id, self.name).with_steps(self.steps);
        if let Some(timeout) = self.default_timeout_seconds {
            definition.default_timeout_seconds = timeout;
        }
        if let Some(retries) = self.default_max_retries {
            definition.default_max_retries = retries;
        }
        definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_a_two_step_workflow_with_a_dependency() {
        let mut builder = WorkflowBuilder::new("wf-1", "ws-1", "proj-1", "demo");
        let step_a = builder.step("a", "Fetch", StepType::Task).prompt("summarize the ticket").build();
        let step_b = builder
            .step("b", "Review", StepType::Task)
            .depends_on(["a"])
            .input("summary", "steps.a.content")
            .build();
        let definition = builder.add_step(step_a).add_step(step_b).build();

        assert_eq!(definition.steps.len(), 2);
        assert_eq!(definition.steps[1].depends_on_steps.len(), 1);
        assert!(definition.steps[1].depends_on_steps.contains("a"));
        assert_eq!(definition.steps[1].inputs().get("summary").unwrap(), "steps.a.content");
    }

    #[test]
    fn default_timeout_and_retries_override_workflow_defaults() {
        let definition = WorkflowBuilder::new("wf-2", "ws-1", "proj-1", "demo").default_timeout_seconds(60).default_max_retries(1).build();
        assert_eq!(definition.default_timeout_seconds, 60);
        assert_eq!(definition.default_max_retries, 1);
    }
}
