// Aggregation and report files

use imagebench::aggregation::{render_table, summarize};
use imagebench::artifacts::{
    REPORT_JSON_FILE, REPORT_TEXT_FILE, SUMMARY_FILE, safe_name, task_artifact_name, write_reports,
};
use imagebench::models::{
    BenchmarkRun, BenchmarkTask, ContainerUsage, FailureKind, ResourceSnapshot, RunResult,
    WorkloadSpec,
};
use std::time::Duration;
use tempfile::TempDir;

fn task(seq: usize, image: &str, workload: &str, iteration: u32) -> BenchmarkTask {
    BenchmarkTask {
        seq,
        image: image.into(),
        workload: WorkloadSpec::new(workload, "true", Duration::from_secs(60)),
        iteration,
    }
}

fn ok(seq: usize, image: &str, iteration: u32, secs: f64, cpu: f64) -> RunResult {
    RunResult::succeeded(
        task(seq, image, "gpu_stress", iteration),
        secs,
        ResourceSnapshot::empty(),
        ResourceSnapshot::empty(),
    )
    .with_usage(Some(ContainerUsage {
        cpu_percent: cpu,
        mem_usage_bytes: 512,
        mem_limit_bytes: 1024,
        mem_percent: 50.0,
        samples: 3,
    }))
}

fn failed(seq: usize, image: &str, iteration: u32, kind: FailureKind) -> RunResult {
    RunResult::failed(
        task(seq, image, "gpu_stress", iteration),
        kind,
        "boom",
        ResourceSnapshot::empty(),
        ResourceSnapshot::empty(),
    )
}

fn sample_run() -> BenchmarkRun {
    let mut run = BenchmarkRun::new("run-agg");
    // completion order differs from task order
    run.push(ok(1, "a/b:1", 2, 3.0, 80.0));
    run.push(ok(0, "a/b:1", 1, 1.0, 40.0));
    run.push(failed(3, "a_b_1", 2, FailureKind::TimedOut));
    run.push(failed(2, "a_b_1", 1, FailureKind::NonZeroExit));
    run.finish();
    run
}

#[test]
fn summarize_groups_and_means() {
    let report = summarize(&sample_run());
    assert_eq!(report.total_tasks, 4);
    assert_eq!(report.total_successes, 2);
    assert_eq!(report.groups.len(), 2);

    let g = &report.groups[0];
    assert_eq!(g.image, "a/b:1");
    assert_eq!(g.runs, 2);
    assert_eq!(g.successes, 2);
    assert_eq!(g.avg_runtime_s, Some(2.0));
    assert_eq!(g.min_runtime_s, Some(1.0));
    assert_eq!(g.max_runtime_s, Some(3.0));
    assert_eq!(g.avg_cpu_percent, Some(60.0));
    assert_eq!(g.avg_mem_percent, Some(50.0));
}

#[test]
fn group_without_successes_is_undefined() {
    let report = summarize(&sample_run());
    let g = &report.groups[1];
    assert_eq!(g.image, "a_b_1");
    assert_eq!(g.successes, 0);
    assert_eq!(g.failures, 2);
    assert_eq!(g.timeouts, 1);
    assert!(g.avg_runtime_s.is_none());
    assert!(g.avg_cpu_percent.is_none());
    assert!(g.avg_mem_percent.is_none());

    let table = render_table(&report);
    let row = table
        .lines()
        .find(|l| l.starts_with("a_b_1"))
        .expect("row for a_b_1");
    assert!(row.contains("undefined"));
    assert!(!row.contains("NaN"));
}

#[test]
fn success_without_usage_leaves_cpu_undefined() {
    let mut run = BenchmarkRun::new("run-nousage");
    run.push(RunResult::succeeded(
        task(0, "img", "w", 1),
        2.5,
        ResourceSnapshot::empty(),
        ResourceSnapshot::empty(),
    ));
    let g = &summarize(&run).groups[0];
    assert_eq!(g.avg_runtime_s, Some(2.5));
    assert!(g.avg_cpu_percent.is_none());
}

#[test]
fn table_has_header_and_one_row_per_group() {
    let table = render_table(&summarize(&sample_run()));
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[0].starts_with("image"));
    assert!(lines[0].contains("avg_runtime_s"));
    assert!(lines[1].starts_with("-----"));
    assert!(lines[2].starts_with("a/b:1"));
    assert!(lines[3].starts_with("a_b_1"));
    assert!(table.contains("4 tasks, 2 succeeded"));
}

#[test]
fn artifact_names_do_not_collide() {
    let rewritten = task_artifact_name(&task(0, "a/b:1", "gpu_stress", 1));
    let literal = task_artifact_name(&task(1, "a_b_1", "gpu_stress", 1));
    assert_eq!(literal, "a_b_1__gpu_stress__iter1.json");
    assert!(rewritten.starts_with("a_b_1-"));
    assert!(rewritten.ends_with("__gpu_stress__iter1.json"));
    assert_ne!(rewritten, literal);
    assert_eq!(safe_name("a_b_1"), "a_b_1");
}

#[test]
fn write_reports_creates_all_files() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("reports");
    let run = sample_run();
    let report = summarize(&run);

    let written = write_reports(&out, &run, &report, true).unwrap();
    assert!(out.join(SUMMARY_FILE).exists());
    assert!(out.join(REPORT_JSON_FILE).exists());
    assert!(out.join(REPORT_TEXT_FILE).exists());
    assert_eq!(written.task_files.len(), 4);
    let unique: std::collections::HashSet<_> = written.task_files.iter().collect();
    assert_eq!(unique.len(), 4);

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&written.summary).unwrap()).unwrap();
    let results = summary["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    let seqs: Vec<u64> = results
        .iter()
        .map(|r| r["task"]["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    assert_eq!(results[2]["failure"], "non_zero_exit");

    let report_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&written.report_json).unwrap()).unwrap();
    assert!(report_json["groups"][1]["avgRuntimeS"].is_null());

    let per_task: RunResult = serde_json::from_str(
        &std::fs::read_to_string(out.join("a_b_1__gpu_stress__iter2.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(per_task.failure, Some(FailureKind::TimedOut));
}

#[test]
fn write_reports_without_task_files() {
    let dir = TempDir::new().unwrap();
    let run = sample_run();
    let written = write_reports(dir.path(), &run, &summarize(&run), false).unwrap();
    assert!(written.task_files.is_empty());
    let count = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(count, 3);
}
