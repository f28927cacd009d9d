// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared error types for the orchestration core.

use thiserror::Error;

/// Errors raised while validating or executing a workflow graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("workflow has no steps")]
    MissingSteps,

    #[error("duplicate step names: {0:?}")]
    DuplicateStepNames(Vec<String>),

    #[error("step orders are not a contiguous range: missing {0:?}")]
    NonSequentialOrder(Vec<i64>),

    #[error("two or more steps share order {0}")]
    DuplicateOrder(i64),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    MissingDependency { step: String, dependency: String },

    #[error("circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("unreachable steps: {0:?}")]
    UnreachableSteps(Vec<String>),

    #[error("breaking change: step '{0}' was removed but is still referenced")]
    BreakingChange(String),
}

/// Non-fatal advisory produced alongside validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyWarning {
    NoEntryPoints,
    MissingAgentConfiguration(String),
}

impl std::fmt::Display for DependencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyWarning::NoEntryPoints => write!(f, "no clear entry points found"),
            DependencyWarning::MissingAgentConfiguration(step) => write!(
                f,
                "agent step '{step}' has no agent_definition_id or agent_instance_id"
            ),
        }
    }
}

/// Errors raised by LLM routing.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error("no provider available for the requested strategy")]
    NoProviderAvailable,

    #[error("all providers in the fallback chain failed: {0:?}")]
    AllProvidersFailed(Vec<(String, String)>),
}

/// Errors raised by the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow definition not found or inactive: {0}")]
    DefinitionNotFound(String),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("execution '{0}' not found or already finalized")]
    ExecutionNotFound(String),

    #[error("unsupported step type: {0}")]
    UnsupportedStepType(String),

    #[error("step '{0}' timed out")]
    StepTimeout(String),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Provider(#[from] crate::providers::ProviderError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Errors raised by the multi-agent controller.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error("no suitable agent found for step '{0}'")]
    NoSuitableAgent(String),

    #[error("agent step timed out after {0}s")]
    Timeout(u64),

    #[error("agent execution failed: {0}")]
    AgentExecutionFailed(String),
}

/// Errors raised by the file-level approval engine.
#[derive(Debug, Clone, Error)]
pub enum ApprovalError {
    #[error("file approval '{0}' not found")]
    NotFound(String),

    #[error("invalid transition from {from} via {action}")]
    InvalidTransition { from: String, action: String },

    #[error("rejection requires a comment")]
    CommentRequired,
}

/// Errors raised by the secret engine.
#[derive(Debug, Clone, Error)]
pub enum SecretError {
    #[error("workspace '{0}' not found")]
    WorkspaceNotFound(String),

    #[error("a secret named '{0}' already exists in this workspace")]
    DuplicateName(String),

    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

/// Errors raised by encryption backends.
#[derive(Debug, Clone, Error)]
pub enum EncryptionError {
    #[error("encryption backend not initialized")]
    NotInitialized,

    #[error("encryption operation failed: {0}")]
    OperationFailed(String),

    #[error("unsupported encryption backend: {0}")]
    UnsupportedBackend(String),
}
