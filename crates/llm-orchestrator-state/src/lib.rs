// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence and recovery for the orchestrator's in-process engines.
//!
//! `llm-orchestrator-core` and `llm-orchestrator-secrets` define the
//! collaborator traits they need (`AgentDirectory`, `SecretStore`,
//! `WorkspaceDirectory`, `ExecutionStore`) but never implement them --
//! persistence is a concern for the process wiring the engines together,
//! not for the engines themselves. This crate is that implementation: one
//! sqlx `Any`-driver pool backs every store, so the same schema and queries
//! run against Postgres in production and SQLite in tests and the bundled
//! recovery demo.

pub mod agent_directory;
pub mod error;
pub mod execution_store;
pub mod pool;
pub mod secret_store;

pub use agent_directory::SqlAgentDirectory;
pub use error::{Result, StateError};
pub use execution_store::SqlExecutionStore;
pub use pool::{connect, ensure_schema, StatePool};
pub use secret_store::{SqlSecretStore, SqlWorkspaceDirectory};

// Re-exported so callers constructing an `IntegrationFacade` don't also need
// a direct `llm-orchestrator-core` dependency just for these two types.
pub use llm_orchestrator_core::facade::{ExecutionStore, WorkflowExecutionRecord};
