// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `Orchestrator`: the SDK's entry point for registering providers and
//! running workflows without hand-wiring `LLMRouter`/`LLMService`/
//! `WorkflowExecutor` at every call site.

use crate::error::{Result, SdkError};
use llm_orchestrator_core::config::OrchestratorConfig;
use llm_orchestrator_core::context::WorkflowContext;
use llm_orchestrator_core::controller::MultiAgentController;
use llm_orchestrator_core::events::EventBroadcasterRef;
use llm_orchestrator_core::executor::{StepResult, WorkflowExecutor};
use llm_orchestrator_core::llm_service::{CostLogger, LLMService};
use llm_orchestrator_core::providers::ProviderRef;
use llm_orchestrator_core::router::LLMRouter;
use llm_orchestrator_core::workflow::WorkflowDefinition;
use llm_orchestrator_providers::{AnthropicProvider, MistralProvider, OllamaProvider, OpenAIProvider, TogetherProvider};
use std::collections::HashMap;
use std::sync::Arc;

/// Accumulates provider registrations and collaborators, then builds the
/// `LLMService` an `Orchestrator` runs workflows against.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    providers: HashMap<String, ProviderRef>,
    cost_logger: Option<Box<dyn CostLogger>>,
    controller: Option<Arc<MultiAgentController>>,
    broadcaster: Option<EventBroadcasterRef>,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            providers: HashMap::new(),
            cost_logger: None,
            controller: None,
            broadcaster: None,
        }
    }

    /// Registers every provider whose credentials are present in the
    /// process environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...),
    /// plus Ollama unconditionally since it needs no API key. Providers
    /// with no credentials set are silently skipped rather than erroring --
    /// a workflow that never routes to them doesn't need them configured.
    pub fn with_providers_from_env(mut self) -> Self {
        if let Ok(provider) = OpenAIProvider::from_env() {
            self.providers.insert("openai".to_string(), Arc::new(provider));
        }
        if let Ok(provider) = AnthropicProvider::from_env() {
            self.providers.insert("anthropic".to_string(), Arc::new(provider));
        }
        if let Ok(provider) = MistralProvider::from_env() {
            self.providers.insert("mistral".to_string(), Arc::new(provider));
        }
        if let Ok(provider) = TogetherProvider::from_env() {
            self.providers.insert("together".to_string(), Arc::new(provider));
        }
        self.providers.insert("ollama".to_string(), Arc::new(OllamaProvider::from_env()));
        self
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: ProviderRef) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn with_cost_logger(mut self, logger: Box<dyn CostLogger>) -> Self {
        self.cost_logger = Some(logger);
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

    pub fn build(self) -> Orchestrator {
        let router = LLMRouter::new(self.providers.clone(), self.config.llm_routing_strategy);
        let mut service = LLMService::new(self.providers, router, self.config.llm_enable_fallback);
        if let Some(logger) = self.cost_logger {
            service = service.with_cost_logger(logger);
        }

        Orchestrator {
            config: self.config,
            llm_service: Arc::new(service),
            controller: self.controller,
            broadcaster: self.broadcaster,
        }
    }
}

/// Runs `WorkflowDefinition`s against the providers and collaborators
/// registered through [`OrchestratorBuilder`].
pub struct Orchestrator {
    config: OrchestratorConfig,
    llm_service: Arc<LLMService>,
    controller: Option<Arc<MultiAgentController>>,
    broadcaster: Option<EventBroadcasterRef>,
}

impl Orchestrator {
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn llm_service(&self) -> &Arc<LLMService> {
        &self.llm_service
    }

    /// Validates, wires up collaborators, and executes `definition` end to
    /// end, returning one `StepResult` per step that ran or was skipped.
    pub async fn run(&self, definition: WorkflowDefinition, context: WorkflowContext) -> Result<Vec<StepResult>> {
        if definition.steps.is_empty() {
            return Err(SdkError::EmptyWorkflow);
        }

        let mut executor = WorkflowExecutor::new(definition, context)?.with_llm_service(self.llm_service.clone());
        if let Some(controller) = &self.controller {
            executor = executor.with_controller(controller.clone());
        }
        if let Some(broadcaster) = &self.broadcaster {
            executor = executor.with_broadcaster(broadcaster.clone());
        }

        Ok(executor.execute().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_orchestrator_core::workflow::{StepType, WorkflowStep};
    use std::collections::HashMap as StdHashMap;

    #[tokio::test]
    async fn running_a_workflow_with_no_providers_fails_its_task_step() {
        let orchestrator = OrchestratorBuilder::new(OrchestratorConfig::default()).build();
        let step = WorkflowStep::new("t1", "T1", 1, StepType::Task);
        let definition = WorkflowDefinition::new("wf-1", "ws-1", "proj-1", "demo").with_steps(vec![step]);
        let context = WorkflowContext::new("exec-1", "ws-1", "proj-1", StdHashMap::new());

        let results = orchestrator.run(definition, context).await.unwrap();
        assert_eq!(results[0].status, llm_orchestrator_core::workflow::StepExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn running_an_empty_workflow_is_rejected_before_execution() {
        let orchestrator = OrchestratorBuilder::new(OrchestratorConfig::default()).build();
        let definition = WorkflowDefinition::new("wf-2", "ws-1", "proj-1", "empty");
        let context = WorkflowContext::new("exec-2", "ws-1", "proj-1", StdHashMap::new());

        let err = orchestrator.run(definition, context).await.unwrap_err();
        assert!(matches!(err, SdkError::EmptyWorkflow));
    }

    #[test]
    fn condition_only_workflow_runs_without_any_providers_registered() {
        // with_providers_from_env must not panic when no credentials are set.
        let _orchestrator = OrchestratorBuilder::new(OrchestratorConfig::default()).with_providers_from_env().build();
    }
}
