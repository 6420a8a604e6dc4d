// Report files for one BenchmarkRun: summary.json, report.json, report.txt and
// optional per-task JSON files under the output directory.

use crate::aggregation::render_table;
use crate::models::{BenchmarkRun, BenchmarkTask, Report, RunResult};
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const SUMMARY_FILE: &str = "summary.json";
pub const REPORT_JSON_FILE: &str = "report.json";
pub const REPORT_TEXT_FILE: &str = "report.txt";

/// Hex chars of the SHA-256 suffix appended to rewritten names.
const HASH_SUFFIX_LEN: usize = 8;

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Filesystem-safe form of `name`. Unsafe characters become `_`; if any were
/// rewritten, `-<8 hex of sha256(name)>` is appended so `a/b:1` and a literal
/// `a_b_1` land in different files.
pub fn safe_name(name: &str) -> String {
    let mut rewritten = false;
    let mut out: String = name
        .chars()
        .map(|c| {
            if is_safe_char(c) {
                c
            } else {
                rewritten = true;
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        rewritten = true;
    }
    if rewritten {
        let digest = Sha256::digest(name.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        out.push('-');
        out.push_str(&hex[..HASH_SUFFIX_LEN]);
    }
    out
}

/// `{safe_image}__{safe_workload}__iter{n}.json`
pub fn task_artifact_name(task: &BenchmarkTask) -> String {
    format!(
        "{}__{}__iter{}.json",
        safe_name(&task.image),
        safe_name(&task.workload.name),
        task.iteration
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryFile<'a> {
    run_id: &'a str,
    started_at_nanos: i64,
    finished_at_nanos: i64,
    total_tasks: usize,
    total_successes: usize,
    results: Vec<&'a RunResult>,
}

/// Paths written by `write_reports`.
#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub summary: PathBuf,
    pub report_json: PathBuf,
    pub report_text: PathBuf,
    pub task_files: Vec<PathBuf>,
}

#[instrument(skip(run, report), fields(operation = "write_reports", run_id = %run.run_id))]
pub fn write_reports(
    dir: &Path,
    run: &BenchmarkRun,
    report: &Report,
    write_task_artifacts: bool,
) -> Result<WrittenReports> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output directory {}", dir.display()))?;

    let summary = dir.join(SUMMARY_FILE);
    write_json(
        &summary,
        &SummaryFile {
            run_id: &run.run_id,
            started_at_nanos: run.started_at_nanos,
            finished_at_nanos: run.finished_at_nanos,
            total_tasks: run.len(),
            total_successes: run.success_count(),
            results: run.ordered_results(),
        },
    )?;

    let report_json = dir.join(REPORT_JSON_FILE);
    write_json(&report_json, report)?;

    let report_text = dir.join(REPORT_TEXT_FILE);
    std::fs::write(&report_text, render_table(report))
        .with_context(|| format!("write {}", report_text.display()))?;

    let mut task_files = Vec::new();
    if write_task_artifacts {
        for result in run.ordered_results() {
            let path = dir.join(task_artifact_name(&result.task));
            write_json(&path, result)?;
            task_files.push(path);
        }
    }

    info!(
        dir = %dir.display(),
        task_files = task_files.len(),
        "reports written"
    );
    Ok(WrittenReports {
        summary,
        report_json,
        report_text,
        task_files,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}
