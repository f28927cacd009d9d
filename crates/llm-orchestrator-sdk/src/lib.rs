// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ergonomic Rust SDK for building and running LLM orchestrator workflows
//! programmatically, without hand-wiring `LLMRouter`/`LLMService`/
//! `WorkflowExecutor` at every call site.
//!
//! ```no_run
//! use llm_orchestrator_core::config::OrchestratorConfig;
//! use llm_orchestrator_core::context::WorkflowContext;
//! use llm_orchestrator_core::workflow::StepType;
//! use llm_orchestrator_sdk::{Orchestrator, OrchestratorBuilder, WorkflowBuilder};
//! use std::collections::HashMap;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator: Orchestrator = OrchestratorBuilder::new(OrchestratorConfig::from_env())
//!     .with_providers_from_env()
//!     .build();
//!
//! let mut builder = WorkflowBuilder::new("wf-1", "ws-1", "proj-1", "triage");
//! let step = builder.step("summarize", "Summarize", StepType::Task).prompt("summarize the ticket").build();
//! let definition = builder.add_step(step).build();
//!
//! let context = WorkflowContext::new("exec-1", "ws-1", "proj-1", HashMap::new());
//! let results = orchestrator.run(definition, context).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod workflow_builder;

pub use client::{Orchestrator, OrchestratorBuilder};
pub use error::{SdkError, Result};
pub use workflow_builder::{StepBuilder, WorkflowBuilder};
