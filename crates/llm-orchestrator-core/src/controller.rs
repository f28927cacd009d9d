// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-agent assignment, resource reservation, and failover.
//!
//! The controller never talks to persistence directly: it asks an
//! `AgentDirectory` collaborator for available instances/definitions and to
//! flip an instance's status, so the transition from an in-memory test
//! double to a database-backed directory never touches this module.

use crate::agents::{AgentDefinition, AgentInstance, AgentStatus};
use crate::context::WorkflowContext;
use crate::error::ControllerError;
use crate::workflow::WorkflowStep;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Collaborator that knows how to list and update agents. Implemented by the
/// persistence layer; the controller only depends on the trait.
pub trait AgentDirectory: Send + Sync {
    fn available_instances(&self, workspace_id: &str, project_id: &str) -> Vec<AgentInstance>;
    fn definition(&self, id: &str) -> Option<AgentDefinition>;
    fn set_instance_status(&self, instance_id: &str, status: AgentStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStrategy {
    RoundRobin,
    LeastLoaded,
    CapabilityMatch,
    ResourceBased,
}

impl AssignmentStrategy {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "round_robin" => Self::RoundRobin,
            "least_loaded" => Self::LeastLoaded,
            "resource_based" => Self::ResourceBased,
            _ => Self::CapabilityMatch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentAssignment {
    pub instance_id: String,
    pub definition_id: String,
    pub agent_instance: AgentInstance,
    pub agent_definition: AgentDefinition,
    pub assignment_strategy: AssignmentStrategy,
    pub assigned_at: DateTime<Utc>,
    pub reserved_resources: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AgentReservation {
    pub assignment: AgentAssignment,
    pub workspace_id: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AgentFailoverRecord {
    pub step_execution_id: String,
    pub failure_reason: String,
    pub failover_attempts: u32,
    pub max_failover_attempts: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentStats {
    pub active_assignments: usize,
    pub active_reservations: usize,
    pub failover_records: usize,
    pub round_robin_counters: usize,
}

/// Coordinates agent assignment, resource reservation, and automatic
/// failover for agent-typed workflow steps.
pub struct MultiAgentController {
    directory: Box<dyn AgentDirectory>,
    active_assignments: DashMap<String, AgentAssignment>,
    active_reservations: DashMap<String, AgentReservation>,
    failover_records: DashMap<String, AgentFailoverRecord>,
    round_robin_counters: DashMap<String, AtomicU64>,
}

impl MultiAgentController {
    pub fn new(directory: Box<dyn AgentDirectory>) -> Self {
        Self {
            directory,
            active_assignments: DashMap::new(),
            active_reservations: DashMap::new(),
            failover_records: DashMap::new(),
            round_robin_counters: DashMap::new(),
        }
    }

    /// Assigns an agent to `step`, retrying against alternative agents up to
    /// `max_failover_attempts` times before giving up.
    pub fn assign_with_failover(
        &self,
        step: &WorkflowStep,
        context: &WorkflowContext,
        step_execution_id: &str,
        max_failover_attempts: u32,
    ) -> Result<AgentAssignment, ControllerError> {
        let mut assignment = self
            .assign_agent(step, context)
            .ok_or_else(|| ControllerError::NoSuitableAgent(step.name.clone()))?;

        let mut attempts = 0u32;
        loop {
            if self.validate_assignment(&assignment) {
                if attempts > 0 {
                    tracing::info!(step = %step.name, attempts, "failover successful");
                }
                self.active_assignments.insert(step_execution_id.to_string(), assignment.clone());
                return Ok(assignment);
            }

            attempts += 1;
            tracing::warn!(step = %step.name, attempts, "agent assignment validation failed");

            if attempts > max_failover_attempts {
                self.failover_records.insert(
                    step_execution_id.to_string(),
                    AgentFailoverRecord {
                        step_execution_id: step_execution_id.to_string(),
                        failure_reason: "assignment validation failed".to_string(),
                        failover_attempts: attempts,
                        max_failover_attempts,
                        created_at: Utc::now(),
                    },
                );
                return Err(ControllerError::NoSuitableAgent(step.name.clone()));
            }

            match self.assign_agent(step, context) {
                Some(next) => assignment = next,
                None => {
                    self.failover_records.insert(
                        step_execution_id.to_string(),
                        AgentFailoverRecord {
                            step_execution_id: step_execution_id.to_string(),
                            failure_reason: "no failover agent available".to_string(),
                            failover_attempts: attempts,
                            max_failover_attempts,
                            created_at: Utc::now(),
                        },
                    );
                    return Err(ControllerError::NoSuitableAgent(step.name.clone()));
                }
            }
        }
    }

    fn validate_assignment(&self, assignment: &AgentAssignment) -> bool {
        matches!(assignment.agent_instance.status, AgentStatus::Busy | AgentStatus::Idle)
    }

    fn assign_agent(&self, step: &WorkflowStep, context: &WorkflowContext) -> Option<AgentAssignment> {
        let available = self.directory.available_instances(&context.workspace_id, &context.project_id);
        if available.is_empty() {
            tracing::warn!(workspace_id = %context.workspace_id, "no available agents");
            return None;
        }

        let required_capabilities: Vec<String> = step.agent_selector.required_capabilities.clone();

        let suitable: Vec<(AgentInstance, AgentDefinition)> = available
            .into_iter()
            .filter_map(|instance| {
                let definition = self.directory.definition(&instance.definition_id)?;
                if !definition.is_enabled {
                    return None;
                }
                if let Some(wanted) = &step.agent_selector.agent_instance_id {
                    if &instance.id != wanted {
                        return None;
                    }
                }
                if let Some(wanted) = &step.agent_selector.agent_definition_id {
                    if &instance.definition_id != wanted {
                        return None;
                    }
                }
                if !required_capabilities.is_empty()
                    && !required_capabilities.iter().any(|cap| definition.capabilities.contains(cap))
                {
                    return None;
                }
                Some((instance, definition))
            })
            .collect();

        if suitable.is_empty() {
            tracing::warn!(step = %step.name, "no suitable agents match requirements");
            return None;
        }

        let strategy = step
            .assignment_strategy()
            .map(|s| AssignmentStrategy::parse(&s))
            .unwrap_or(AssignmentStrategy::CapabilityMatch);

        let (instance, definition) =
            self.select_agent_by_strategy(suitable, strategy, context, &required_capabilities)?;

        self.directory.set_instance_status(&instance.id, AgentStatus::Busy);

        Some(AgentAssignment {
            instance_id: instance.id.clone(),
            definition_id: definition.id.clone(),
            agent_instance: instance,
            agent_definition: definition,
            assignment_strategy: strategy,
            assigned_at: Utc::now(),
            reserved_resources: HashMap::new(),
        })
    }

    fn select_agent_by_strategy(
        &self,
        suitable: Vec<(AgentInstance, AgentDefinition)>,
        strategy: AssignmentStrategy,
        context: &WorkflowContext,
        required_capabilities: &[String],
    ) -> Option<(AgentInstance, AgentDefinition)> {
        match strategy {
            AssignmentStrategy::RoundRobin => {
                let key = format!("{}:{}", context.workspace_id, context.project_id);
                let counter = self.round_robin_counters.entry(key).or_insert_with(|| AtomicU64::new(0));
                let idx = counter.fetch_add(1, Ordering::SeqCst) as usize % suitable.len();
                suitable.into_iter().nth(idx)
            }
            // Deliberately unscored: a real load metric isn't wired up yet,
            // so this picks uniformly at random among suitable agents.
            AssignmentStrategy::LeastLoaded => suitable.choose(&mut rand::thread_rng()).cloned(),
            // No resource-usage signal is available yet either; falls
            // through to the same scoring as capability_match.
            AssignmentStrategy::ResourceBased | AssignmentStrategy::CapabilityMatch => {
                if required_capabilities.is_empty() {
                    return suitable.into_iter().next();
                }
                suitable.into_iter().max_by_key(|(_, definition)| {
                    required_capabilities
                        .iter()
                        .filter(|cap| definition.capabilities.contains(cap))
                        .count()
                })
            }
        }
    }

    pub fn reserve_resources(&self, assignment: &mut AgentAssignment, context: &WorkflowContext, duration_seconds: i64) -> AgentReservation {
        assignment.reserved_resources.insert(
            "memory_mb".to_string(),
            serde_json::json!(assignment.agent_instance.memory_limit_mb()),
        );
        assignment.reserved_resources.insert(
            "cpu_cores".to_string(),
            serde_json::json!(assignment.agent_instance.cpu_limit_cores()),
        );

        let started_at = Utc::now();
        let reservation = AgentReservation {
            assignment: assignment.clone(),
            workspace_id: context.workspace_id.clone(),
            project_id: context.project_id.clone(),
            started_at,
            expires_at: started_at + ChronoDuration::seconds(duration_seconds),
        };
        self.active_reservations.insert(assignment.instance_id.clone(), reservation.clone());
        reservation
    }

    pub fn release_resources(&self, reservation: &AgentReservation) {
        self.active_reservations.remove(&reservation.assignment.instance_id);
        self.directory.set_instance_status(&reservation.assignment.instance_id, AgentStatus::Idle);
        tracing::info!(instance_id = %reservation.assignment.instance_id, "released agent resources");
    }

    /// Drops expired reservations and failover records older than 24 hours.
    pub fn cleanup_stale_assignments(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .active_reservations
            .iter()
            .filter(|entry| entry.expires_at < now)
            .map(|entry| entry.key().clone())
            .collect();
        for instance_id in expired {
            self.active_reservations.remove(&instance_id);
            tracing::warn!(instance_id = %instance_id, "cleaned up expired reservation");
        }

        let cutoff = now - ChronoDuration::hours(24);
        let stale: Vec<String> = self
            .failover_records
            .iter()
            .filter(|entry| entry.created_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        for step_id in stale {
            self.failover_records.remove(&step_id);
        }
    }

    pub fn get_assignment_stats(&self) -> AssignmentStats {
        AssignmentStats {
            active_assignments: self.active_assignments.len(),
            active_reservations: self.active_reservations.len(),
            failover_records: self.failover_records.len(),
            round_robin_counters: self.round_robin_counters.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{AgentSelector, StepType};
    use std::sync::Mutex;

    struct FakeDirectory {
        instances: Vec<AgentInstance>,
        definitions: HashMap<String, AgentDefinition>,
        statuses: Mutex<HashMap<String, AgentStatus>>,
    }

    impl AgentDirectory for FakeDirectory {
        fn available_instances(&self, workspace_id: &str, project_id: &str) -> Vec<AgentInstance> {
            self.instances
                .iter()
                .filter(|i| i.workspace_id == workspace_id && i.project_id == project_id)
                .filter(|i| {
                    self.statuses
                        .lock()
                        .unwrap()
                        .get(&i.id)
                        .map(|s| *s == AgentStatus::Idle)
                        .unwrap_or(i.status == AgentStatus::Idle)
                })
                .cloned()
                .collect()
        }

        fn definition(&self, id: &str) -> Option<AgentDefinition> {
            self.definitions.get(id).cloned()
        }

        fn set_instance_status(&self, instance_id: &str, status: AgentStatus) {
            self.statuses.lock().unwrap().insert(instance_id.to_string(), status);
        }
    }

    fn instance(id: &str, def: &str) -> AgentInstance {
        AgentInstance {
            id: id.to_string(),
            definition_id: def.to_string(),
            workspace_id: "ws".to_string(),
            project_id: "proj".to_string(),
            status: AgentStatus::Idle,
            config: HashMap::new(),
        }
    }

    fn definition(id: &str, caps: &[&str]) -> AgentDefinition {
        AgentDefinition {
            id: id.to_string(),
            name: id.to_string(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
            is_enabled: true,
        }
    }

    fn directory() -> FakeDirectory {
        let mut definitions = HashMap::new();
        definitions.insert("def-code".to_string(), definition("def-code", &["code"]));
        FakeDirectory {
            instances: vec![instance("agent-1", "def-code")],
            definitions,
            statuses: Mutex::new(HashMap::new()),
        }
    }

    fn step_with_capability(cap: &str) -> WorkflowStep {
        let mut step = WorkflowStep::new("s1", "s1", 1, StepType::Agent);
        step.agent_selector = AgentSelector {
            required_capabilities: vec![cap.to_string()],
            ..Default::default()
        };
        step
    }

    #[test]
    fn assigns_agent_matching_capability() {
        let controller = MultiAgentController::new(Box::new(directory()));
        let context = WorkflowContext::new("exec", "ws", "proj", HashMap::new());
        let step = step_with_capability("code");
        let assignment = controller.assign_with_failover(&step, &context, "se-1", 3).unwrap();
        assert_eq!(assignment.instance_id, "agent-1");
    }

    #[test]
    fn no_suitable_agent_returns_error() {
        let controller = MultiAgentController::new(Box::new(directory()));
        let context = WorkflowContext::new("exec", "ws", "proj", HashMap::new());
        let step = step_with_capability("vision");
        let result = controller.assign_with_failover(&step, &context, "se-1", 3);
        assert!(matches!(result, Err(ControllerError::NoSuitableAgent(_))));
    }

    #[test]
    fn cleanup_removes_expired_reservation() {
        let controller = MultiAgentController::new(Box::new(directory()));
        let context = WorkflowContext::new("exec", "ws", "proj", HashMap::new());
        let step = step_with_capability("code");
        let mut assignment = controller.assign_with_failover(&step, &context, "se-1", 3).unwrap();
        let reservation = controller.reserve_resources(&mut assignment, &context, -10);
        assert_eq!(controller.get_assignment_stats().active_reservations, 1);
        controller.cleanup_stale_assignments();
        assert_eq!(controller.get_assignment_stats().active_reservations, 0);
        let _ = reservation;
    }
}
