// Reduce a BenchmarkRun into per-(image, workload) summaries and render them as a table.
// Means cover successful results only; a group without any is reported as undefined (None).

use crate::models::{BenchmarkRun, GroupSummary, Report, RunResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub fn summarize(run: &BenchmarkRun) -> Report {
    let mut groups: BTreeMap<(String, String), Vec<&RunResult>> = BTreeMap::new();
    for r in &run.results {
        groups
            .entry((r.task.image.clone(), r.task.workload.name.clone()))
            .or_default()
            .push(r);
    }

    let groups = groups
        .into_iter()
        .map(|((image, workload), results)| summarize_group(image, workload, &results))
        .collect();

    Report {
        run_id: run.run_id.clone(),
        total_tasks: run.len(),
        total_successes: run.success_count(),
        groups,
    }
}

fn summarize_group(image: String, workload: String, results: &[&RunResult]) -> GroupSummary {
    let ok: Vec<&RunResult> = results.iter().copied().filter(|r| r.success).collect();
    let runtimes: Vec<f64> = ok.iter().map(|r| r.duration_seconds).collect();
    let cpu: Vec<f64> = ok
        .iter()
        .filter_map(|r| r.usage.as_ref().map(|u| u.cpu_percent))
        .collect();
    let mem: Vec<f64> = ok
        .iter()
        .filter_map(|r| r.usage.as_ref().map(|u| u.mem_percent))
        .collect();

    GroupSummary {
        image,
        workload,
        runs: results.len(),
        successes: ok.len(),
        failures: results.len() - ok.len(),
        timeouts: results.iter().filter(|r| r.timed_out()).count(),
        avg_runtime_s: mean(&runtimes),
        min_runtime_s: runtimes.iter().copied().reduce(f64::min),
        max_runtime_s: runtimes.iter().copied().reduce(f64::max),
        avg_cpu_percent: mean(&cpu),
        avg_mem_percent: mean(&mem),
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

const UNDEFINED: &str = "undefined";

fn fmt_opt(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(x) => format!("{:.*}", precision, x),
        None => UNDEFINED.to_string(),
    }
}

/// Fixed-width table, one row per group, in (image, workload) order.
pub fn render_table(report: &Report) -> String {
    let headers = [
        "image",
        "workload",
        "runs",
        "ok",
        "avg_runtime_s",
        "avg_cpu_%",
        "avg_mem_%",
    ];
    let rows: Vec<[String; 7]> = report
        .groups
        .iter()
        .map(|g| {
            [
                g.image.clone(),
                g.workload.clone(),
                g.runs.to_string(),
                g.successes.to_string(),
                fmt_opt(g.avg_runtime_s, 3),
                fmt_opt(g.avg_cpu_percent, 1),
                fmt_opt(g.avg_mem_percent, 1),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, cells: &[&str]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(&mut out, &headers);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let rule_refs: Vec<&str> = rule.iter().map(String::as_str).collect();
    line(&mut out, &rule_refs);
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        line(&mut out, &cells);
    }
    let _ = writeln!(
        out,
        "\n{} tasks, {} succeeded (run {})",
        report.total_tasks, report.total_successes, report.run_id
    );
    out
}
