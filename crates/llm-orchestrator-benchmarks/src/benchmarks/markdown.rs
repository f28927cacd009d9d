// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Markdown report generation for a completed benchmark run.

use super::result::BenchmarkResult;
use std::fmt::Write as _;

/// Renders a human-readable markdown summary of a batch of benchmark
/// results. One table row per target, with ops/sec and duration pulled
/// out of `metrics` when present.
pub fn generate_markdown_report(results: &[BenchmarkResult]) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "# Benchmark Results\n");

    if results.is_empty() {
        report.push_str("No benchmark results to report.\n");
        return report;
    }

    let _ = writeln!(report, "Ran {} benchmark target(s).\n", results.len());
    let _ = writeln!(report, "| Target | Duration (ms) | Ops/sec | Timestamp |");
    let _ = writeln!(report, "|---|---|---|---|");

    for result in results {
        let duration = result.duration_ms().map(|d| format!("{d:.3}")).unwrap_or_else(|| "-".to_string());
        let ops = result.ops_per_sec().map(|o| format!("{o:.1}")).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            report,
            "| {} | {} | {} | {} |",
            result.target_id,
            duration,
            ops,
            result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_results_produce_a_placeholder_message() {
        let report = generate_markdown_report(&[]);
        assert!(report.contains("No benchmark results"));
    }

    #[test]
    fn report_includes_a_row_per_target() {
        let results = vec![
            BenchmarkResult::new("target_a", json!({"duration_ms": 10.0, "ops_per_sec": 500.0})),
            BenchmarkResult::new("target_b", json!({"duration_ms": 20.0})),
        ];
        let report = generate_markdown_report(&results);
        assert!(report.contains("target_a"));
        assert!(report.contains("target_b"));
        assert!(report.contains("500.0"));
    }
}
