// Outcome of one benchmark task, and the collection of outcomes for one invocation.

use serde::{Deserialize, Serialize};

use super::{BenchmarkTask, ContainerUsage, ResourceSnapshot};

/// Why a task failed. Timeouts are kept apart from non-zero exits so consumers can
/// tell "ran and failed" from "never finished".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImageUnavailable,
    NonZeroExit,
    TimedOut,
    RuntimeError,
    Internal,
    NotStarted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ImageUnavailable => "image_unavailable",
            FailureKind::NonZeroExit => "non_zero_exit",
            FailureKind::TimedOut => "timed_out",
            FailureKind::RuntimeError => "runtime_error",
            FailureKind::Internal => "internal",
            FailureKind::NotStarted => "not_started",
        }
    }

    /// Parse the stored tag (see `as_str`). Unknown tags map to `Internal`.
    pub fn from_tag(s: &str) -> Self {
        match s {
            "image_unavailable" => FailureKind::ImageUnavailable,
            "non_zero_exit" => FailureKind::NonZeroExit,
            "timed_out" => FailureKind::TimedOut,
            "runtime_error" => FailureKind::RuntimeError,
            "not_started" => FailureKind::NotStarted,
            _ => FailureKind::Internal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one BenchmarkTask. Build through `succeeded` / `failed` / `not_started`
/// so `success` and `failure` always agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub task: BenchmarkTask,
    pub success: bool,
    pub duration_seconds: f64,
    pub exit_status: Option<i64>,
    pub pre: ResourceSnapshot,
    pub post: ResourceSnapshot,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub usage: Option<ContainerUsage>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub timestamp_nanos: i64,
}

impl RunResult {
    pub fn succeeded(
        task: BenchmarkTask,
        duration_seconds: f64,
        pre: ResourceSnapshot,
        post: ResourceSnapshot,
    ) -> Self {
        Self {
            task,
            success: true,
            duration_seconds,
            exit_status: Some(0),
            pre,
            post,
            error: None,
            failure: None,
            usage: None,
            stdout: String::new(),
            stderr: String::new(),
            timestamp_nanos: super::now_nanos(),
        }
    }

    pub fn failed(
        task: BenchmarkTask,
        failure: FailureKind,
        error: impl Into<String>,
        pre: ResourceSnapshot,
        post: ResourceSnapshot,
    ) -> Self {
        Self {
            task,
            success: false,
            duration_seconds: 0.0,
            exit_status: None,
            pre,
            post,
            error: Some(error.into()),
            failure: Some(failure),
            usage: None,
            stdout: String::new(),
            stderr: String::new(),
            timestamp_nanos: super::now_nanos(),
        }
    }

    /// Task never dispatched (deadline passed or shutdown requested).
    pub fn not_started(task: BenchmarkTask, reason: &str) -> Self {
        Self::failed(
            task,
            FailureKind::NotStarted,
            reason,
            ResourceSnapshot::empty(),
            ResourceSnapshot::empty(),
        )
    }

    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }

    pub fn with_exit_status(mut self, exit_status: Option<i64>) -> Self {
        self.exit_status = exit_status;
        self
    }

    pub fn with_usage(mut self, usage: Option<ContainerUsage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn timed_out(&self) -> bool {
        self.failure == Some(FailureKind::TimedOut)
    }
}

/// All results for one invocation. Results arrive in completion order; use
/// `ordered_results` to get enumeration order back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRun {
    pub run_id: String,
    pub started_at_nanos: i64,
    pub finished_at_nanos: i64,
    pub results: Vec<RunResult>,
}

impl BenchmarkRun {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at_nanos: super::now_nanos(),
            finished_at_nanos: 0,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: RunResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at_nanos = super::now_nanos();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn ordered_results(&self) -> Vec<&RunResult> {
        let mut out: Vec<&RunResult> = self.results.iter().collect();
        out.sort_by_key(|r| r.task.seq);
        out
    }
}

/// Run id derived from the start time, e.g. `run-20260101T120000.123Z`.
pub fn new_run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}
