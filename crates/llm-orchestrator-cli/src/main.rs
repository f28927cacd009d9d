// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! LLM Orchestrator CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use llm_orchestrator_benchmarks::{
    benchmarks::io::{write_raw_results, write_summary},
    run_all_benchmarks,
};
use llm_orchestrator_core::config::OrchestratorConfig;
use llm_orchestrator_core::context::WorkflowContext;
use llm_orchestrator_core::dependency_resolver;
use llm_orchestrator_core::executor::new_execution_id;
use llm_orchestrator_core::workflow::WorkflowDefinition;
use llm_orchestrator_sdk::OrchestratorBuilder;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "llm-orchestrator")]
#[command(version, about = "LLM Workflow Orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition
    Validate {
        /// Path to workflow file
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Run a workflow
    Run {
        /// Path to workflow file
        #[arg(value_name = "FILE")]
        file: String,

        /// Input JSON string or file, merged into the workflow's initial variables
        #[arg(short, long)]
        input: Option<String>,

        /// Workspace id the execution is scoped to
        #[arg(long, default_value = "default-workspace")]
        workspace: String,

        /// Project id the execution is scoped to
        #[arg(long, default_value = "default-project")]
        project: String,
    },

    /// Run the canonical benchmark suite
    Benchmark {
        /// Output directory for benchmark results
        #[arg(short, long, default_value = "benchmarks/output")]
        output: String,

        /// Output format: json, markdown, or both
        #[arg(short, long, default_value = "both")]
        format: String,

        /// Run benchmarks quietly (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_orchestrator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Run { file, input, workspace, project } => run_workflow(&file, input.as_deref(), &workspace, &project).await,
        Commands::Benchmark { output, format, quiet } => run_benchmarks(&output, &format, quiet).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_workflow(file_path: &str) -> Result<WorkflowDefinition> {
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow YAML: {}", file_path))
}

fn validate_workflow(file_path: &str) -> Result<()> {
    info!("Validating workflow: {}", file_path);
    println!("{} {}", "Validating workflow:".cyan().bold(), file_path);

    let workflow = load_workflow(file_path)?;
    info!("Parsed workflow: {} v{}", workflow.name, workflow.version);

    let validation = dependency_resolver::validate(&workflow.steps);
    if !validation.is_valid() {
        println!("{}", "✗ Workflow is invalid".red().bold());
        for err in &validation.errors {
            println!("  {} {}", "error:".red(), err);
        }
        anyhow::bail!("workflow validation failed with {} error(s)", validation.errors.len());
    }

    println!("{}", "✓ Workflow is valid".green().bold());
    println!("  Name: {}", workflow.name);
    println!("  Version: {}", workflow.version);
    println!("  Steps: {}", workflow.steps.len());
    for warning in &validation.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }

    Ok(())
}

async fn run_workflow(file_path: &str, input: Option<&str>, workspace_id: &str, project_id: &str) -> Result<()> {
    info!("Running workflow: {}", file_path);
    println!("{} {}", "Running workflow:".cyan().bold(), file_path);

    let workflow = load_workflow(file_path)?;
    info!("Parsed workflow: {} v{}", workflow.name, workflow.version);

    let validation = dependency_resolver::validate(&workflow.steps);
    if !validation.is_valid() {
        anyhow::bail!(
            "workflow validation failed: {}",
            validation.errors.first().map(|e| e.to_string()).unwrap_or_default()
        );
    }

    let variables = if let Some(input_str) = input { parse_input(input_str)? } else { HashMap::new() };
    info!("Workflow variables: {:?}", variables);

    let orchestrator = OrchestratorBuilder::new(OrchestratorConfig::from_env()).with_providers_from_env().build();

    let execution_id = new_execution_id();
    let context = WorkflowContext::new(execution_id, workspace_id, project_id, variables);

    println!("{}", "Executing workflow...".cyan());
    let results = orchestrator.run(workflow, context).await.with_context(|| "Workflow execution failed")?;

    let failed = results.iter().any(|r| r.status == llm_orchestrator_core::workflow::StepExecutionStatus::Failed);
    if failed {
        println!("{}", "✗ Workflow completed with failures".red().bold());
    } else {
        println!("{}", "✓ Workflow completed successfully".green().bold());
    }

    println!("\n{}", "Results:".cyan().bold());
    for result in &results {
        println!(
            "  {} {} ({:?}, {}ms)",
            "●".cyan(),
            result.step_id,
            result.status,
            result.duration.as_millis()
        );
        if let Some(err) = &result.error {
            println!("    {} {}", "error:".red(), err);
        }
    }

    if failed {
        anyhow::bail!("one or more workflow steps failed");
    }
    Ok(())
}

fn parse_input(input_str: &str) -> Result<HashMap<String, Value>> {
    // Check if input is a file path
    if Path::new(input_str).exists() {
        let content = fs::read_to_string(input_str).with_context(|| format!("Failed to read input file: {}", input_str))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse input JSON from file: {}", input_str))
    } else {
        // Try to parse as JSON string
        serde_json::from_str(input_str).with_context(|| "Failed to parse input JSON string")
    }
}

/// Runs the canonical benchmark suite.
async fn run_benchmarks(output_dir: &str, format: &str, quiet: bool) -> Result<()> {
    if !quiet {
        println!("{}", "Running LLM Orchestrator Benchmarks...".cyan().bold());
        println!();
    }

    info!("Starting benchmark suite");

    // Run all benchmarks
    let results = run_all_benchmarks().await;

    if !quiet {
        println!("{} {} benchmarks", "✓ Completed".green().bold(), results.len());
        println!();

        // Print summary
        for result in &results {
            let duration = result
                .metrics
                .get("duration_ms")
                .and_then(|v| v.as_f64())
                .map(|d| format!("{:.2}ms", d))
                .unwrap_or_else(|| "N/A".to_string());

            let ops = result
                .metrics
                .get("ops_per_sec")
                .and_then(|v| v.as_f64())
                .map(|o| format!("{:.0} ops/sec", o))
                .unwrap_or_else(|| "".to_string());

            println!("  {} {} - {} {}", "●".green(), result.target_id.cyan(), duration, ops.dimmed());
        }
        println!();
    }

    // Create output directory
    fs::create_dir_all(output_dir).with_context(|| format!("Failed to create output directory: {}", output_dir))?;

    // Write output based on format
    let write_json = format == "json" || format == "both";
    let write_md = format == "markdown" || format == "both";

    if write_json {
        let paths = write_raw_results(&results, output_dir).with_context(|| "Failed to write raw benchmark results")?;

        if !quiet {
            println!("{} JSON results written:", "✓".green().bold());
            for path in &paths {
                println!("  {}", path.dimmed());
            }
        }
    }

    if write_md {
        let summary_path = write_summary(&results, output_dir).with_context(|| "Failed to write benchmark summary")?;

        if !quiet {
            println!("{} Summary written: {}", "✓".green().bold(), summary_path.dimmed());
        }
    }

    if !quiet {
        println!();
        println!("{}", "Benchmark suite completed successfully!".green().bold());
    }

    info!("Benchmark suite completed with {} results", results.len());

    Ok(())
}
