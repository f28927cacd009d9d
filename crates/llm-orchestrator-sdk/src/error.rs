// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error type surfaced by the SDK's ergonomic wrappers.

use llm_orchestrator_core::error::WorkflowError;
use llm_orchestrator_core::providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("no provider registered under the name '{0}'")]
    UnknownProvider(String),

    #[error("provider '{0}' could not be constructed from the environment: {1}")]
    ProviderSetup(String, ProviderError),

    #[error("workflow has no steps")]
    EmptyWorkflow,

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

pub type Result<T> = std::result::Result<T, SdkError>;
