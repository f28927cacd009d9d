// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validation and ordering of a workflow's step graph.
//!
//! Exposed as pure, stateless functions rather than a resolver object with
//! mutable `errors`/`warnings` accumulators: each call returns everything it
//! found, so two validations of two different workflows can never bleed
//! state into each other.

use crate::error::{DependencyError, DependencyWarning};
use crate::workflow::{StepType, WorkflowStep};
use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of validating a workflow's step graph.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<DependencyError>,
    pub warnings: Vec<DependencyWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs every structural check against a full step list: uniqueness,
/// sequential ordering, dependency existence, cycles, agent configuration,
/// and reachability.
pub fn validate(steps: &[WorkflowStep]) -> ValidationResult {
    let mut result = ValidationResult::default();

    if steps.is_empty() {
        result.errors.push(DependencyError::MissingSteps);
        return result;
    }

    check_duplicate_names(steps, &mut result);
    check_sequential_order(steps, &mut result);

    let graph = build_graph(steps);
    check_missing_dependencies(steps, &graph, &mut result);
    check_self_dependencies(steps, &mut result);
    check_circular_dependencies(&graph, &mut result);
    check_agent_requirements(steps, &mut result);
    check_reachability(&graph, &mut result);

    result
}

/// Validates that replacing `existing` with `updated` doesn't orphan a
/// dependency on a step that no longer exists.
pub fn validate_step_updates(existing: &[WorkflowStep], updated: &[WorkflowStep]) -> ValidationResult {
    let mut result = ValidationResult::default();

    let new_graph = build_graph(updated);
    check_missing_dependencies(updated, &new_graph, &mut result);
    check_circular_dependencies(&new_graph, &mut result);

    let old_ids: HashSet<&str> = existing.iter().map(|s| s.id.as_str()).collect();
    let new_ids: HashSet<&str> = updated.iter().map(|s| s.id.as_str()).collect();
    let removed: HashSet<&str> = old_ids.difference(&new_ids).copied().collect();

    for step in updated {
        for dep in &step.depends_on_steps {
            if removed.contains(dep.as_str()) {
                result.errors.push(DependencyError::BreakingChange(dep.clone()));
            }
        }
    }

    result
}

fn build_graph(steps: &[WorkflowStep]) -> HashMap<String, HashSet<String>> {
    let mut graph = HashMap::new();
    for step in steps {
        graph.insert(step.id.clone(), step.depends_on_steps.clone());
    }
    graph
}

fn check_duplicate_names(steps: &[WorkflowStep], result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    let mut dupes = Vec::new();
    for step in steps {
        if !seen.insert(step.name.clone()) && !dupes.contains(&step.name) {
            dupes.push(step.name.clone());
        }
    }
    if !dupes.is_empty() {
        result.errors.push(DependencyError::DuplicateStepNames(dupes));
    }
}

fn check_sequential_order(steps: &[WorkflowStep], result: &mut ValidationResult) {
    let mut orders: Vec<i64> = steps.iter().map(|s| s.step_order).collect();
    orders.sort_unstable();

    let mut counts: HashMap<i64, u32> = HashMap::new();
    for &o in &orders {
        *counts.entry(o).or_insert(0) += 1;
    }
    for (&order, &count) in &counts {
        if count > 1 {
            result.errors.push(DependencyError::DuplicateOrder(order));
        }
    }

    if let (Some(&min), Some(&max)) = (orders.first(), orders.last()) {
        let actual: HashSet<i64> = orders.iter().copied().collect();
        let missing: Vec<i64> = (min..=max).filter(|o| !actual.contains(o)).collect();
        if !missing.is_empty() {
            result.errors.push(DependencyError::NonSequentialOrder(missing));
        }
    }
}

fn check_missing_dependencies(
    steps: &[WorkflowStep],
    graph: &HashMap<String, HashSet<String>>,
    result: &mut ValidationResult,
) {
    for step in steps {
        for dep in &step.depends_on_steps {
            if !graph.contains_key(dep) {
                result.errors.push(DependencyError::MissingDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
}

fn check_self_dependencies(steps: &[WorkflowStep], result: &mut ValidationResult) {
    for step in steps {
        if step.depends_on_steps.contains(&step.id) {
            result.errors.push(DependencyError::SelfDependency(step.name.clone()));
        }
    }
}

fn check_circular_dependencies(graph: &HashMap<String, HashSet<String>>, result: &mut ValidationResult) {
    let mut visited = HashSet::new();
    let mut stack = HashSet::new();

    for node in graph.keys() {
        if !visited.contains(node) {
            if let Some(cycle) = dfs_cycle(node, graph, &mut visited, &mut stack) {
                result.errors.push(DependencyError::CircularDependency(cycle.join(" -> ")));
                return;
            }
        }
    }
}

fn dfs_cycle(
    node: &str,
    graph: &HashMap<String, HashSet<String>>,
    visited: &mut HashSet<String>,
    stack: &mut HashSet<String>,
) -> Option<Vec<String>> {
    if stack.contains(node) {
        return Some(vec![node.to_string()]);
    }
    if visited.contains(node) {
        return None;
    }

    visited.insert(node.to_string());
    stack.insert(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            if let Some(mut path) = dfs_cycle(dep, graph, visited, stack) {
                path.push(node.to_string());
                stack.remove(node);
                return Some(path);
            }
        }
    }

    stack.remove(node);
    None
}

fn check_agent_requirements(steps: &[WorkflowStep], result: &mut ValidationResult) {
    for step in steps {
        if matches!(step.step_type, StepType::Agent | StepType::Task)
            && step.agent_selector.agent_definition_id.is_none()
            && step.agent_selector.agent_instance_id.is_none()
        {
            result
                .warnings
                .push(DependencyWarning::MissingAgentConfiguration(step.name.clone()));
        }
    }
}

fn check_reachability(graph: &HashMap<String, HashSet<String>>, result: &mut ValidationResult) {
    if graph.is_empty() {
        return;
    }

    // A step with no dependencies is an entry point; steps are walked by
    // following *dependents*, not dependencies, so "reachable" means
    // "reachable forward from some entry point" the same way the Python
    // source's DFS over the dependency edges did.
    let entry_points: Vec<&String> = graph.iter().filter(|(_, deps)| deps.is_empty()).map(|(id, _)| id).collect();

    if entry_points.is_empty() {
        result.warnings.push(DependencyWarning::NoEntryPoints);
        return;
    }

    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, deps) in graph {
        for dep in deps {
            reverse.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = entry_points.iter().map(|s| s.as_str()).collect();
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(dependents) = reverse.get(node) {
            for &d in dependents {
                queue.push_back(d);
            }
        }
    }

    let unreachable: Vec<String> = graph.keys().filter(|id| !visited.contains(id.as_str())).cloned().collect();
    if !unreachable.is_empty() {
        result.errors.push(DependencyError::UnreachableSteps(unreachable));
    }
}

/// Kahn's-algorithm topological order over the full step set. Errors if the
/// graph contains a cycle.
pub fn get_topological_order(steps: &[WorkflowStep]) -> Result<Vec<String>, DependencyError> {
    let graph = build_graph(steps);
    let levels = topological_levels(&graph)?;
    Ok(levels.into_iter().flatten().collect())
}

/// Groups steps into levels that can run in parallel: every step in a level
/// depends only on steps in earlier levels.
pub fn get_parallel_execution_groups(steps: &[WorkflowStep]) -> Result<Vec<Vec<WorkflowStep>>, DependencyError> {
    let step_map: HashMap<String, WorkflowStep> = steps.iter().map(|s| (s.id.clone(), s.clone())).collect();
    let graph = build_graph(steps);

    for step in steps {
        for dep in &step.depends_on_steps {
            if !step_map.contains_key(dep) {
                return Err(DependencyError::MissingDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let levels = topological_levels(&graph)?;
    Ok(levels
        .into_iter()
        .map(|level| level.into_iter().map(|id| step_map[&id].clone()).collect())
        .collect())
}

fn topological_levels(graph: &HashMap<String, HashSet<String>>) -> Result<Vec<Vec<String>>, DependencyError> {
    // in_degree[node] = number of unresolved dependencies of node.
    let mut in_degree: HashMap<&str, usize> = graph
        .iter()
        .map(|(id, deps)| (id.as_str(), deps.len()))
        .collect();

    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, deps) in graph {
        for dep in deps {
            reverse.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut levels = Vec::new();
    let mut resolved = 0usize;

    while !queue.is_empty() {
        let current_level: Vec<&str> = queue.drain(..).collect();
        resolved += current_level.len();
        levels.push(current_level.iter().map(|s| s.to_string()).collect());

        for &node in &current_level {
            if let Some(dependents) = reverse.get(node) {
                for &dependent in dependents {
                    if let Some(count) = in_degree.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }
    }

    if resolved != graph.len() {
        return Err(DependencyError::CircularDependency(
            "unresolved steps remain after topological sort".to_string(),
        ));
    }

    Ok(levels)
}

/// True if every dependency of `step` is in `completed` and the step isn't
/// already running.
pub fn can_execute_step_now(step: &WorkflowStep, completed: &HashSet<String>, running: &HashSet<String>) -> bool {
    if running.contains(&step.id) {
        return false;
    }
    step.depends_on_steps.iter().all(|dep| completed.contains(dep))
}

/// Filters `steps` down to those eligible to start given the current
/// completed/running sets.
pub fn get_next_executable_steps<'a>(
    steps: &'a [WorkflowStep],
    completed: &HashSet<String>,
    running: &HashSet<String>,
) -> Vec<&'a WorkflowStep> {
    steps
        .iter()
        .filter(|s| !completed.contains(&s.id) && !running.contains(&s.id))
        .filter(|s| can_execute_step_now(s, completed, running))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepType;

    fn step(id: &str, order: i64, deps: &[&str]) -> WorkflowStep {
        WorkflowStep::new(id, id, order, StepType::Task)
            .with_depends_on(deps.iter().map(|s| s.to_string()))
    }

    #[test]
    fn empty_workflow_is_invalid() {
        let result = validate(&[]);
        assert!(!result.is_valid());
        assert!(matches!(result.errors[0], DependencyError::MissingSteps));
    }

    #[test]
    fn linear_chain_validates_and_orders_correctly() {
        let steps = vec![step("a", 1, &[]), step("b", 2, &["a"]), step("c", 3, &["b"])];
        let result = validate(&steps);
        assert!(result.is_valid(), "{:?}", result.errors);

        let order = get_topological_order(&steps).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_circular_dependency() {
        let steps = vec![step("a", 1, &["b"]), step("b", 2, &["a"])];
        let result = validate(&steps);
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, DependencyError::CircularDependency(_))));
    }

    #[test]
    fn detects_self_dependency() {
        let steps = vec![step("a", 1, &["a"])];
        let result = validate(&steps);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, DependencyError::SelfDependency(_))));
    }

    #[test]
    fn detects_missing_dependency() {
        let steps = vec![step("a", 1, &["ghost"])];
        let result = validate(&steps);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, DependencyError::MissingDependency { .. })));
    }

    #[test]
    fn parallel_groups_keep_independent_steps_together() {
        let steps = vec![
            step("a", 1, &[]),
            step("b", 2, &[]),
            step("c", 3, &["a", "b"]),
        ];
        let groups = get_parallel_execution_groups(&steps).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn next_executable_steps_respects_completed_and_running() {
        let steps = vec![step("a", 1, &[]), step("b", 2, &["a"]), step("c", 3, &["a"])];
        let completed: HashSet<String> = ["a".to_string()].into_iter().collect();
        let running: HashSet<String> = ["b".to_string()].into_iter().collect();
        let executable = get_next_executable_steps(&steps, &completed, &running);
        assert_eq!(executable.len(), 1);
        assert_eq!(executable[0].id, "c");
    }

    #[test]
    fn breaking_change_detected_when_removed_step_still_depended_on() {
        let existing = vec![step("a", 1, &[]), step("b", 2, &["a"])];
        let updated = vec![step("b", 1, &["a"])];
        let result = validate_step_updates(&existing, &updated);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, DependencyError::BreakingChange(_))));
    }
}
