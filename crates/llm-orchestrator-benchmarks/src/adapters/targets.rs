// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Benchmark target implementations for LLM Orchestrator operations.
//!
//! This module contains concrete implementations of the BenchTarget trait,
//! each measuring a specific orchestration operation.

use super::BenchTarget;
use crate::benchmarks::result::BenchmarkResult;
use async_trait::async_trait;
use llm_orchestrator_core::context::WorkflowContext;
use llm_orchestrator_core::dependency_resolver::{self, get_parallel_execution_groups, get_topological_order};
use llm_orchestrator_core::registry::ModelRegistry;
use llm_orchestrator_core::workflow::{StepType, WorkflowStep};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

fn chain_steps(step_count: usize) -> Vec<WorkflowStep> {
    (0..step_count)
        .map(|i| {
            let deps = if i > 0 { vec![format!("step_{}", i - 1)] } else { vec![] };
            WorkflowStep::new(format!("step_{i}"), format!("Step {i}"), i as i64, StepType::Task).with_depends_on(deps)
        })
        .collect()
}

// ============================================================================
// Workflow DAG Construction Benchmark
// ============================================================================

/// Benchmark target for measuring step-graph validation and topological
/// ordering performance on chains of varying size.
pub struct WorkflowDagConstructionBenchmark {
    iterations: usize,
}

impl WorkflowDagConstructionBenchmark {
    pub fn new() -> Self {
        Self { iterations: 100 }
    }
}

impl Default for WorkflowDagConstructionBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for WorkflowDagConstructionBenchmark {
    fn id(&self) -> &str {
        "workflow_dag_construction"
    }

    fn description(&self) -> &str {
        "Measures step-graph validation and topological ordering performance"
    }

    async fn run(&self) -> BenchmarkResult {
        let small = chain_steps(10);
        let medium = chain_steps(50);
        let large = chain_steps(100);

        let start_small = Instant::now();
        for _ in 0..self.iterations {
            let _ = get_topological_order(&small);
        }
        let duration_small = start_small.elapsed();

        let start_medium = Instant::now();
        for _ in 0..self.iterations {
            let _ = get_topological_order(&medium);
        }
        let duration_medium = start_medium.elapsed();

        let start_large = Instant::now();
        for _ in 0..self.iterations {
            let _ = get_topological_order(&large);
        }
        let duration_large = start_large.elapsed();

        let total_duration = duration_small + duration_medium + duration_large;
        let ops_per_sec = (self.iterations * 3) as f64 / total_duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": total_duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations * 3,
                "ops_per_sec": ops_per_sec,
                "small_chain": {
                    "steps": 10,
                    "duration_ms": duration_small.as_secs_f64() * 1000.0,
                    "avg_ms": duration_small.as_secs_f64() * 1000.0 / self.iterations as f64
                },
                "medium_chain": {
                    "steps": 50,
                    "duration_ms": duration_medium.as_secs_f64() * 1000.0,
                    "avg_ms": duration_medium.as_secs_f64() * 1000.0 / self.iterations as f64
                },
                "large_chain": {
                    "steps": 100,
                    "duration_ms": duration_large.as_secs_f64() * 1000.0,
                    "avg_ms": duration_large.as_secs_f64() * 1000.0 / self.iterations as f64
                }
            }),
        )
    }
}

// ============================================================================
// Workflow Validation Benchmark
// ============================================================================

/// Benchmark target for measuring step-graph validation performance.
pub struct WorkflowValidationBenchmark {
    iterations: usize,
}

impl WorkflowValidationBenchmark {
    pub fn new() -> Self {
        Self { iterations: 1000 }
    }

    fn mixed_steps() -> Vec<WorkflowStep> {
        vec![
            WorkflowStep::new("step1", "Generate", 1, StepType::Task),
            WorkflowStep::new("step2", "Format", 2, StepType::Task).with_depends_on(vec!["step1".to_string()]),
            WorkflowStep::new("step3", "Review", 3, StepType::Condition)
                .with_depends_on(vec!["step2".to_string()])
                .with_condition("steps.step2.approved == true"),
        ]
    }
}

impl Default for WorkflowValidationBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for WorkflowValidationBenchmark {
    fn id(&self) -> &str {
        "workflow_validation"
    }

    fn description(&self) -> &str {
        "Measures workflow step-graph validation performance"
    }

    async fn run(&self) -> BenchmarkResult {
        let steps = Self::mixed_steps();

        let start = Instant::now();
        let mut success_count = 0;

        for _ in 0..self.iterations {
            if dependency_resolver::validate(&steps).is_valid() {
                success_count += 1;
            }
        }

        let duration = start.elapsed();
        let ops_per_sec = self.iterations as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "ops_per_sec": ops_per_sec,
                "success_rate": success_count as f64 / self.iterations as f64,
                "avg_validation_us": duration.as_micros() as f64 / self.iterations as f64
            }),
        )
    }
}

// ============================================================================
// Parallel Step Coordination Benchmark
// ============================================================================

/// Benchmark target for measuring parallel-layer grouping overhead.
///
/// This measures the cost of computing `get_parallel_execution_groups` over
/// a wide, shallow step graph -- the same grouping the executor runs once
/// per workflow execution before dispatching a layer's steps concurrently.
pub struct ParallelStepCoordinationBenchmark {
    iterations: usize,
}

impl ParallelStepCoordinationBenchmark {
    pub fn new() -> Self {
        Self { iterations: 200 }
    }

    fn fan_out_steps(width: usize) -> Vec<WorkflowStep> {
        let mut steps = vec![WorkflowStep::new("root", "root", 0, StepType::Task)];
        for i in 0..width {
            steps.push(
                WorkflowStep::new(format!("leaf_{i}"), format!("leaf {i}"), (i + 1) as i64, StepType::Task)
                    .with_depends_on(vec!["root".to_string()]),
            );
        }
        steps
    }
}

impl Default for ParallelStepCoordinationBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for ParallelStepCoordinationBenchmark {
    fn id(&self) -> &str {
        "parallel_step_coordination"
    }

    fn description(&self) -> &str {
        "Measures parallel execution group computation overhead for wide step graphs"
    }

    async fn run(&self) -> BenchmarkResult {
        let width = 20;
        let steps = Self::fan_out_steps(width);
        let total_ops = self.iterations * (width + 1);

        let start = Instant::now();
        for _ in 0..self.iterations {
            let groups = get_parallel_execution_groups(&steps).expect("fan-out graph is acyclic");
            assert_eq!(groups.len(), 2);
        }
        let duration = start.elapsed();
        let ops_per_sec = total_ops as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "ops_per_sec": ops_per_sec,
                "fan_out_width": width,
                "total_step_operations": total_ops,
                "avg_coordination_overhead_us": duration.as_micros() as f64 / self.iterations as f64
            }),
        )
    }
}

// ============================================================================
// Context Input Resolution Benchmark
// ============================================================================

/// Benchmark target for measuring `WorkflowContext::get_step_input`
/// resolution performance across plain variables and `steps.<id>.<field>`
/// references.
pub struct ContextTemplateRenderingBenchmark {
    iterations: usize,
}

impl ContextTemplateRenderingBenchmark {
    pub fn new() -> Self {
        Self { iterations: 1000 }
    }
}

impl Default for ContextTemplateRenderingBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for ContextTemplateRenderingBenchmark {
    fn id(&self) -> &str {
        "context_input_resolution"
    }

    fn description(&self) -> &str {
        "Measures workflow context step-input resolution performance"
    }

    async fn run(&self) -> BenchmarkResult {
        let mut variables: HashMap<String, Value> = HashMap::new();
        variables.insert("greeting".to_string(), json!("hello"));
        variables.insert("count".to_string(), json!(42));

        let mut context = WorkflowContext::new("bench-exec", "bench-ws", "bench-proj", variables);
        context.set_step_output("generate", json!({"result": "ok", "tokens": 128}));

        let references = ["greeting", "steps.generate.result", "steps.generate.tokens", "steps.missing.field"];

        let start = Instant::now();
        let mut resolved_count = 0;

        for _ in 0..self.iterations {
            for reference in &references {
                if context.get_step_input(reference, Some(json!("default"))).is_some() {
                    resolved_count += 1;
                }
            }
        }

        let duration = start.elapsed();
        let total_resolutions = self.iterations * references.len();
        let ops_per_sec = total_resolutions as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "references_tested": references.len(),
                "total_resolutions": total_resolutions,
                "successful_resolutions": resolved_count,
                "ops_per_sec": ops_per_sec,
                "avg_resolution_us": duration.as_micros() as f64 / total_resolutions as f64
            }),
        )
    }
}

// ============================================================================
// Multi-Model Routing Benchmark
// ============================================================================

/// Benchmark target for measuring `ModelRegistry` lookup performance across
/// the providers a fallback chain would consult.
pub struct MultiModelRoutingBenchmark {
    iterations: usize,
}

impl MultiModelRoutingBenchmark {
    pub fn new() -> Self {
        Self { iterations: 10_000 }
    }
}

impl Default for MultiModelRoutingBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for MultiModelRoutingBenchmark {
    fn id(&self) -> &str {
        "multi_model_routing"
    }

    fn description(&self) -> &str {
        "Measures ModelRegistry lookup performance for multi-provider routing"
    }

    async fn run(&self) -> BenchmarkResult {
        let lookups = [
            ("openai", "gpt-4"),
            ("anthropic", "claude-3-sonnet"),
            ("mistral", "mistral-small"),
            ("unknown", "nonexistent-model"),
            ("ollama", "llama2"),
        ];

        let start = Instant::now();
        let mut hit_count = 0;
        let mut miss_count = 0;

        for _ in 0..self.iterations {
            for (provider, model) in &lookups {
                if ModelRegistry::get_model_config(provider, model).is_some() {
                    hit_count += 1;
                } else {
                    miss_count += 1;
                }
            }
        }

        let duration = start.elapsed();
        let total_lookups = self.iterations * lookups.len();
        let ops_per_sec = total_lookups as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "total_lookups": total_lookups,
                "ops_per_sec": ops_per_sec,
                "cache_hits": hit_count,
                "cache_misses": miss_count,
                "hit_rate": hit_count as f64 / total_lookups as f64,
                "avg_lookup_ns": duration.as_nanos() as f64 / total_lookups as f64,
                "providers_queried": lookups.len()
            }),
        )
    }
}

// ============================================================================
// Evaluation Feedback Loop Benchmark
// ============================================================================

/// Benchmark target for measuring retry/feedback loop speed.
///
/// This measures the overhead of `RetryExecutor`'s exponential-backoff loop,
/// the same wrapper the executor runs around every step attempt.
pub struct EvaluationFeedbackLoopBenchmark {
    iterations: usize,
}

impl EvaluationFeedbackLoopBenchmark {
    pub fn new() -> Self {
        Self { iterations: 100 }
    }
}

impl Default for EvaluationFeedbackLoopBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for EvaluationFeedbackLoopBenchmark {
    fn id(&self) -> &str {
        "evaluation_feedback_loop"
    }

    fn description(&self) -> &str {
        "Measures retry/feedback loop overhead in step execution"
    }

    async fn run(&self) -> BenchmarkResult {
        use llm_orchestrator_core::retry::{RetryExecutor, RetryPolicy};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let retry_policy = RetryPolicy::new(3, Duration::from_micros(100), 2.0, Duration::from_millis(1));

        let success_count = Arc::new(AtomicUsize::new(0));
        let retry_count = Arc::new(AtomicUsize::new(0));

        let start = Instant::now();

        for i in 0..self.iterations {
            let executor = RetryExecutor::new(retry_policy);
            let success_counter = success_count.clone();
            let retry_counter = retry_count.clone();
            let attempt = Arc::new(AtomicUsize::new(0));
            let attempt_clone = attempt.clone();

            let result: Result<u32, &str> = executor
                .execute(|| {
                    let attempt_clone = attempt_clone.clone();
                    let retry_counter = retry_counter.clone();
                    async move {
                        let current_attempt = attempt_clone.fetch_add(1, Ordering::SeqCst);
                        if current_attempt == 0 && i % 2 == 0 {
                            retry_counter.fetch_add(1, Ordering::SeqCst);
                            Err("simulated failure")
                        } else {
                            Ok(42)
                        }
                    }
                })
                .await;

            if result.is_ok() {
                success_counter.fetch_add(1, Ordering::SeqCst);
            }
        }

        let duration = start.elapsed();
        let successes = success_count.load(Ordering::SeqCst);
        let retries = retry_count.load(Ordering::SeqCst);

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "ops_per_sec": self.iterations as f64 / duration.as_secs_f64(),
                "successful_operations": successes,
                "retry_attempts": retries,
                "success_rate": successes as f64 / self.iterations as f64,
                "avg_loop_overhead_us": duration.as_micros() as f64 / self.iterations as f64
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dag_construction_benchmark() {
        let benchmark = WorkflowDagConstructionBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "workflow_dag_construction");
        assert!(result.duration_ms().is_some());
    }

    #[tokio::test]
    async fn test_validation_benchmark() {
        let benchmark = WorkflowValidationBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "workflow_validation");
        assert!(result.ops_per_sec().is_some());
    }

    #[tokio::test]
    async fn test_parallel_coordination_benchmark() {
        let benchmark = ParallelStepCoordinationBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "parallel_step_coordination");
        assert!(result.metrics.get("fan_out_width").is_some());
    }

    #[tokio::test]
    async fn test_context_input_resolution_benchmark() {
        let benchmark = ContextTemplateRenderingBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "context_input_resolution");
        assert!(result.metrics.get("successful_resolutions").is_some());
    }

    #[tokio::test]
    async fn test_multi_model_routing_benchmark() {
        let benchmark = MultiModelRoutingBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "multi_model_routing");
        assert!(result.metrics.get("hit_rate").is_some());
    }

    #[tokio::test]
    async fn test_feedback_loop_benchmark() {
        let benchmark = EvaluationFeedbackLoopBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "evaluation_feedback_loop");
        assert!(result.metrics.get("success_rate").is_some());
    }
}
