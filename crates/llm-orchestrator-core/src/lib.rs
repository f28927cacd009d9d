// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core orchestration engine: LLM routing/fallback, workflow execution, the
//! multi-agent controller, and the collaborators they depend on
//! (dependency resolution, file-level approvals, execution context).
//!
//! Persistence, secrets, and transport all sit behind traits defined here
//! (`CostLogger`, `AgentDirectory`, `EventBroadcaster`) so this crate never
//! depends on a database driver or HTTP client directly.

pub mod agents;
pub mod approval;
pub mod config;
pub mod context;
pub mod controller;
pub mod dependency_resolver;
pub mod error;
pub mod events;
pub mod executor;
pub mod facade;
pub mod llm_service;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod router;
pub mod workflow;

pub use agents::{AgentDefinition, AgentInstance, AgentStatus};
pub use approval::{
    ApprovalActionType, ApprovalEngine, ApprovalHistoryEntry, ApprovalStatus, ChangeType, FileApproval,
    FileApprovalStatus, FileChange, FileChangeInput, InlineComment,
};
pub use config::{EncryptionBackendKind, OrchestratorConfig};
pub use context::WorkflowContext;
pub use controller::{AgentAssignment, AgentDirectory, AgentReservation, AssignmentStrategy, MultiAgentController};
pub use dependency_resolver::ValidationResult;
pub use error::{
    ApprovalError, ControllerError, DependencyError, DependencyWarning, EncryptionError, RouterError, SecretError,
    WorkflowError,
};
pub use controller::AssignmentStats;
pub use events::{EventBroadcaster, EventBroadcasterRef, EventType, InMemoryBroadcaster, WorkflowEvent};
pub use executor::{StepResult, WorkflowExecutor};
pub use facade::{ExecutionEnvelope, ExecutionStore, FacadeStats, IntegrationFacade, WorkflowExecutionRecord};
pub use llm_service::{CostLogger, GenerateContext, LLMService};
pub use providers::{GenerateParams, LLMProvider, LLMResponse, ModelCapabilities, ProviderError, ProviderRef};
pub use registry::{ModelConfig, ModelRegistry};
pub use retry::{RetryExecutor, RetryPolicy};
pub use router::{FallbackChain, LLMRouter, RoutingStrategy, SelectionCriteria, UsageStats};
pub use workflow::{
    AgentSelector, StepExecutionStatus, StepType, WorkflowDefinition, WorkflowExecutionStatus, WorkflowStep,
};
