// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static agent configuration (`AgentDefinition`) and its runtime instances
//! (`AgentInstance`) as tracked by the multi-agent controller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

/// A reusable agent template: capabilities, defaults, and whether it's
/// currently eligible for assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub is_enabled: bool,
}

/// A running/assignable instance of an `AgentDefinition`, scoped to a
/// workspace/project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: String,
    pub definition_id: String,
    pub workspace_id: String,
    pub project_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl AgentInstance {
    pub fn memory_limit_mb(&self) -> u32 {
        self.config.get("memory_limit").and_then(|v| v.as_u64()).unwrap_or(512) as u32
    }

    pub fn cpu_limit_cores(&self) -> u32 {
        self.config.get("cpu_limit").and_then(|v| v.as_u64()).unwrap_or(1) as u32
    }
}
